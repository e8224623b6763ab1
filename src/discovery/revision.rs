//! Base revision resolution

use tracing::debug;

use super::DiscoveryError;
use crate::vcs::VersionControl;

/// Return the first candidate that names a commit.
///
/// Candidates that do not exist or name something other than a commit are
/// skipped. When none qualifies the caller gets
/// [`DiscoveryError::NoBaseRevisionFound`], which it is expected to treat as
/// "nothing changed" rather than as a crash.
pub async fn resolve_base_revision(
    vcs: &dyn VersionControl,
    candidates: &[String],
) -> Result<String, DiscoveryError> {
    for candidate in candidates {
        match vcs.object_type(candidate).await {
            Ok(kind) if kind == "commit" => {
                debug!("Using {} as base revision", candidate);
                return Ok(candidate.clone());
            }
            Ok(kind) => debug!("{} is a {}, not a commit", candidate, kind),
            Err(e) => debug!("{} does not resolve: {}", candidate, e),
        }
    }

    Err(DiscoveryError::NoBaseRevisionFound {
        candidates: candidates.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::testing::FakeRepo;

    fn candidates() -> Vec<String> {
        ["upstream/master", "origin/master", "master"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_only_local_branch_exists() {
        let repo = FakeRepo::default().with_commit("master");
        let rev = resolve_base_revision(&repo, &candidates()).await.unwrap();
        assert_eq!(rev, "master");
    }

    #[tokio::test]
    async fn test_first_candidate_wins() {
        let repo = FakeRepo::default()
            .with_commit("master")
            .with_commit("upstream/master");
        let rev = resolve_base_revision(&repo, &candidates()).await.unwrap();
        assert_eq!(rev, "upstream/master");
    }

    #[tokio::test]
    async fn test_non_commit_objects_are_skipped() {
        let repo = FakeRepo::default()
            .with_object("upstream/master", "tag")
            .with_commit("origin/master");
        let rev = resolve_base_revision(&repo, &candidates()).await.unwrap();
        assert_eq!(rev, "origin/master");
    }

    #[tokio::test]
    async fn test_nothing_resolves() {
        let repo = FakeRepo::default();
        let err = resolve_base_revision(&repo, &candidates())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NoBaseRevisionFound { .. }));
        assert!(err.to_string().contains("origin/master"));
    }
}
