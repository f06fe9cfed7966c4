//! Stable identifiers derived from filesystem paths.
//!
//! The same path always maps to the same id, across fetches and process
//! restarts. Ids are not secrets; md5 is used for speed and spread only.

/// Tag prefixed to worktree node ids.
pub const WORKTREE_TAG: &str = "wt";

/// Tag prefixed to project ids.
pub const PROJECT_TAG: &str = "prj";

/// Number of hex digits kept from the digest (48 bits).
const TOKEN_LEN: usize = 12;

/// Returns the node id for the worktree at `path`.
pub fn identify(path: &str) -> String {
    tagged_id(WORKTREE_TAG, path)
}

/// Returns `<tag>-<token>`, where the token is a short hex digest of `source`.
pub fn tagged_id(tag: &str, source: &str) -> String {
    let digest = format!("{:x}", md5::compute(source));
    format!("{}-{}", tag, &digest[..TOKEN_LEN])
}
