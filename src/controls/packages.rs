use crate::engine::RunContext;
use crate::exec::ExecError;
use crate::model::{Control, ControlResult};
use std::fs;

pub struct RepoConfigured;
pub struct LatestPackage;

const NGINX_STABLE_REPO: &str = "[nginx-stable]\n\
name=nginx stable repo\n\
baseurl=http://nginx.org/packages/rhel/8/$basearch/\n\
gpgcheck=1\n\
enabled=1\n\
gpgkey=https://nginx.org/keys/nginx_signing.key\n\
module_hotfixes=true\n";

impl Control for RepoConfigured {
    fn id(&self) -> &str { "1.2.1" }
    fn title(&self) -> &str { "Ensure package manager repositories are properly configured" }
    fn description(&self) -> &str {
        "Verify that package manager repositories are configured to receive security updates."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        match ctx.command("dnf", &["repolist", "-v", "nginx-stable"]) {
            Ok(out) if out.success() && out.stdout.contains("nginx-stable") => {
                ControlResult::pass(self.id(), "nginx-stable repo is configured")
            }
            Ok(_) => ControlResult::fail(self.id(), "nginx-stable repo not found"),
            Err(ExecError::NotFound(_)) => {
                ControlResult::error(self.id(), "dnf command not found")
            }
            Err(e) => ControlResult::error(self.id(), e.to_string()),
        }
    }

    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        match fs::write(&ctx.paths.repo_file, NGINX_STABLE_REPO) {
            Ok(()) => ControlResult::remediated(
                self.id(),
                format!("nginx-stable repo configured at {}", ctx.paths.repo_file.display()),
            ),
            Err(e) => ControlResult::error(
                self.id(),
                format!("could not write {}: {}", ctx.paths.repo_file.display(), e),
            ),
        }
    }
}

impl Control for LatestPackage {
    fn id(&self) -> &str { "1.2.2" }
    fn title(&self) -> &str { "Ensure the latest software package is installed" }
    fn description(&self) -> &str { "Verify that the latest version of NGINX is installed." }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        match ctx.command("dnf", &["info", "nginx"]) {
            Ok(out) if out.success() && out.stdout.contains("Version") => {
                ControlResult::pass(self.id(), out.stdout.trim())
            }
            Ok(_) => ControlResult::fail(self.id(), "NGINX package info not found"),
            Err(ExecError::NotFound(_)) => {
                ControlResult::error(self.id(), "dnf command not found")
            }
            Err(e) => ControlResult::error(self.id(), e.to_string()),
        }
    }

    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        match ctx.command("dnf", &["update", "-y", "nginx"]) {
            Ok(out) if out.success() => {
                ControlResult::remediated(self.id(), "NGINX package updated")
            }
            Ok(out) => ControlResult::error(
                self.id(),
                format!("dnf update failed: {}", out.stderr.trim()),
            ),
            Err(e) => ControlResult::error(self.id(), e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::mock::{MockCommandRunner, MockResponse};
    use crate::model::Status;
    use crate::test_helpers::{fixture_context_with_runner, nginx_fixture};

    #[test]
    fn configured_repo_passes() {
        let (_dir, paths) = nginx_fixture("user nginx;\n");
        let runner = MockCommandRunner::with_responses(vec![MockResponse::ok(
            "dnf", 0, "repo id: nginx-stable\nrepo name: nginx stable repo\n", "",
        )]);
        let ctx = fixture_context_with_runner(paths, runner);
        assert_eq!(RepoConfigured.check(&ctx).status, Status::Pass);
    }

    #[test]
    fn missing_repo_fails_but_missing_dnf_errors() {
        let (_dir, paths) = nginx_fixture("user nginx;\n");
        let runner = MockCommandRunner::with_responses(vec![
            MockResponse::ok("dnf", 1, "", "Error: Unknown repo: 'nginx-stable'\n"),
        ]);
        let ctx = fixture_context_with_runner(paths, runner);
        assert_eq!(RepoConfigured.check(&ctx).status, Status::Fail);

        let (_dir2, paths2) = nginx_fixture("user nginx;\n");
        let runner = MockCommandRunner::with_responses(vec![MockResponse::err(
            "dnf",
            ExecError::NotFound("dnf".to_string()),
        )]);
        let ctx = fixture_context_with_runner(paths2, runner);
        let result = RepoConfigured.check(&ctx);
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.output, "dnf command not found");
    }

    #[test]
    fn repo_remediation_writes_stanza_and_is_idempotent() {
        let (dir, paths) = nginx_fixture("user nginx;\n");
        let ctx = fixture_context_with_runner(paths, MockCommandRunner::new());

        let first = RepoConfigured.remediate(&ctx);
        assert_eq!(first.status, Status::Remediated);
        let written = std::fs::read_to_string(dir.path().join("nginx.repo")).unwrap();
        assert!(written.contains("[nginx-stable]"));
        assert!(written.contains("gpgcheck=1"));

        let second = RepoConfigured.remediate(&ctx);
        assert_eq!(second.status, Status::Remediated);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("nginx.repo")).unwrap(),
            written
        );
    }

    #[test]
    fn package_info_with_version_passes() {
        let (_dir, paths) = nginx_fixture("user nginx;\n");
        let runner = MockCommandRunner::with_responses(vec![MockResponse::ok(
            "dnf", 0, "Name : nginx\nVersion : 1.26.1\n", "",
        )]);
        let ctx = fixture_context_with_runner(paths, runner);
        let result = LatestPackage.check(&ctx);
        assert_eq!(result.status, Status::Pass);
        assert!(result.output.contains("Version"));
    }

    #[test]
    fn update_failure_is_an_error() {
        let (_dir, paths) = nginx_fixture("user nginx;\n");
        let runner = MockCommandRunner::with_responses(vec![MockResponse::ok(
            "dnf", 1, "", "Transaction failed\n",
        )]);
        let ctx = fixture_context_with_runner(paths, runner);
        let result = LatestPackage.remediate(&ctx);
        assert_eq!(result.status, Status::Error);
        assert!(result.output.contains("Transaction failed"));
    }
}
