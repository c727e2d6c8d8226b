//! Protocol reader tests against the in-memory servers.

mod nfs_tests;
mod smb_tests;
