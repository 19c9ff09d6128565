//! Workspace root. The kernel lives in the member crates; start from the
//! `axon` umbrella crate. Workspace-level integration tests are in
//! `tests/`.
