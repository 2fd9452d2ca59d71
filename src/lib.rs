//! # Sesame (single sign-on authentication)
//!
//! `sesame` issues and verifies signed session tokens, hands tokens between
//! clients through short-lived authorization codes, and gates registration
//! behind emailed verification codes.
//!
//! ## Tokens
//!
//! Session tokens are HS256 signed JWTs carrying [`auth::SessionClaims`].
//! They are verified without a server-side lookup; the only way to revoke
//! them early is to rotate the signing key.
//!
//! ## Short-lived codes
//!
//! Authorization codes and email verification codes live in a
//! [`store::CodeStore`] with a TTL. Authorization codes are single-use and are
//! removed atomically on redemption. Email codes stay valid until they expire
//! unless the service is started with `--email-code-single-use`.

pub mod auth;
pub mod cli;
pub mod email;
pub mod sesame;
pub mod store;
pub mod users;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
