use crate::engine::RunContext;
use crate::exec::ExecError;
use crate::model::{Control, ControlResult};
use crate::nginx;

pub struct MinimalModules;
pub struct NoWebdavModule;
pub struct NoGzipModules;
pub struct AutoindexDisabled;

/// `nginx -V` build information, which nginx splits across stderr and stdout.
fn build_info(id: &str, ctx: &RunContext) -> Result<String, ControlResult> {
    match ctx.command("nginx", &["-V"]) {
        Ok(out) if out.success() => Ok(out.combined().trim().to_string()),
        Ok(_) => Err(ControlResult::fail(id, "failed to retrieve NGINX build info")),
        Err(ExecError::NotFound(_)) => Err(ControlResult::error(id, "nginx command not found")),
        Err(e) => Err(ControlResult::error(id, e.to_string())),
    }
}

fn recompile_guidance(id: &str, configure_args: &str) -> ControlResult {
    ControlResult::manual(
        id,
        format!(
            "Recompile NGINX from source without the unwanted module(s):\n\
             \x20 dnf install -y gcc make wget tar zlib-devel pcre-devel openssl-devel\n\
             \x20 wget http://nginx.org/download/nginx-1.26.1.tar.gz -O /tmp/nginx.tar.gz\n\
             \x20 tar -xf /tmp/nginx.tar.gz -C /tmp\n\
             \x20 cd /tmp/nginx-1.26.1 && ./configure {}\n\
             \x20 make && make install",
            configure_args
        ),
    )
}

impl Control for MinimalModules {
    fn id(&self) -> &str { "2.1.1" }
    fn title(&self) -> &str { "Ensure only required modules are installed" }
    fn description(&self) -> &str {
        "Audit NGINX to verify only the necessary modules are installed."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        match build_info(self.id(), ctx) {
            Ok(build) => ControlResult::pass(self.id(), build),
            Err(result) => result,
        }
    }

    fn remediate(&self, _ctx: &RunContext) -> ControlResult {
        ControlResult::manual(
            self.id(),
            "Review the output of 'nginx -V' and identify unnecessary modules.\n\
             Recompile NGINX from source using './configure' without the unwanted modules.\n\
             Example:\n\
             \x20 ./configure --with-http_ssl_module --without-http_autoindex_module\n\
             \x20 make && make install\n\
             Consult the NGINX documentation for available module flags.",
        )
    }
}

impl Control for NoWebdavModule {
    fn id(&self) -> &str { "2.1.2" }
    fn title(&self) -> &str { "Ensure HTTP WebDAV module is not installed" }
    fn description(&self) -> &str {
        "Verify that the http_dav_module is not compiled into NGINX."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        match build_info(self.id(), ctx) {
            Ok(build) if build.contains("http_dav_module") => {
                ControlResult::fail(self.id(), "http_dav_module detected")
            }
            Ok(_) => ControlResult::pass(self.id(), "http_dav_module not found"),
            Err(result) => result,
        }
    }

    fn remediate(&self, _ctx: &RunContext) -> ControlResult {
        recompile_guidance(self.id(), "--with-http_ssl_module --without-http_dav_module")
    }
}

impl Control for NoGzipModules {
    fn id(&self) -> &str { "2.1.3" }
    fn title(&self) -> &str { "Ensure modules with gzip functionality are disabled" }
    fn description(&self) -> &str {
        "Verify that http_gzip_module and http_gzip_static_module are not compiled into NGINX."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        let build = match build_info(self.id(), ctx) {
            Ok(build) => build,
            Err(result) => return result,
        };
        let found: Vec<&str> = ["http_gzip_module", "http_gzip_static_module"]
            .into_iter()
            .filter(|module| build.contains(module))
            .collect();
        if found.is_empty() {
            ControlResult::pass(self.id(), "No gzip modules found")
        } else {
            ControlResult::fail(
                self.id(),
                format!("Gzip modules detected: {}", found.join(", ")),
            )
        }
    }

    fn remediate(&self, _ctx: &RunContext) -> ControlResult {
        recompile_guidance(
            self.id(),
            "--with-http_ssl_module --without-http_gzip_module --without-http_gzip_static_module",
        )
    }
}

impl Control for AutoindexDisabled {
    fn id(&self) -> &str { "2.1.4" }
    fn title(&self) -> &str { "Ensure the autoindex module is disabled" }
    fn description(&self) -> &str {
        "Verify that the autoindex directive is not set to 'on' in NGINX configuration files."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        let hits = match nginx::scan_matching_lines(&ctx.paths, "autoindex") {
            Ok(hits) => hits,
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        };
        let enabled: Vec<String> = hits
            .iter()
            .filter(|(_, line)| line.to_lowercase().contains("autoindex on"))
            .map(|(file, line)| format!("{}: {}", file.display(), line))
            .collect();
        if enabled.is_empty() {
            ControlResult::pass(self.id(), "No autoindex enabled directives found")
        } else {
            ControlResult::fail(self.id(), enabled.join("\n"))
        }
    }

    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        match nginx::disable_autoindex(&ctx.paths) {
            Ok(changes) if changes.is_empty() => ControlResult::remediated(
                self.id(),
                "No changes needed (autoindex already disabled)",
            ),
            Ok(changes) => {
                let reloaded = nginx::reload_nginx(ctx);
                let mut output = changes.join("\n");
                output.push_str(if reloaded {
                    "\nnginx reloaded"
                } else {
                    "\nnginx reload failed; reload manually"
                });
                ControlResult::remediated(self.id(), output)
            }
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
    use std::fs;

    const BUILD_WITH_DAV: &str =
        "nginx version: nginx/1.26.1\nconfigure arguments: --with-http_ssl_module --with-http_dav_module";
    const BUILD_PLAIN: &str =
        "nginx version: nginx/1.26.1\nconfigure arguments: --with-http_ssl_module";

    fn ctx_with_build(build: &str) -> crate::engine::RunContext {
        let runner =
            MockCommandRunner::with_responses(vec![MockResponse::ok("nginx", 0, "", build)]);
        crate::engine::RunContext::new(std::sync::Arc::new(runner))
    }

    #[test]
    fn build_listing_passes_as_informational() {
        let result = MinimalModules.check(&ctx_with_build(BUILD_PLAIN));
        assert_eq!(result.status, Status::Pass);
        assert!(result.output.contains("configure arguments"));
    }

    #[test]
    fn webdav_module_is_flagged() {
        assert_eq!(NoWebdavModule.check(&ctx_with_build(BUILD_WITH_DAV)).status, Status::Fail);
        assert_eq!(NoWebdavModule.check(&ctx_with_build(BUILD_PLAIN)).status, Status::Pass);
    }

    #[test]
    fn gzip_modules_are_listed_when_present() {
        let build = "configure arguments: --with-http_gzip_static_module";
        let result = NoGzipModules.check(&ctx_with_build(build));
        assert_eq!(result.status, Status::Fail);
        assert!(result.output.contains("http_gzip_static_module"));
        assert!(!result.output.contains("http_gzip_module,"));
    }

    #[test]
    fn module_remediations_are_manual() {
        let ctx = ctx_with_build(BUILD_PLAIN);
        for result in [
            MinimalModules.remediate(&ctx),
            NoWebdavModule.remediate(&ctx),
            NoGzipModules.remediate(&ctx),
        ] {
            assert_eq!(result.status, Status::Manual);
            assert!(result.output.contains("./configure"));
        }
    }

    #[test]
    fn autoindex_on_fails_and_off_passes() {
        let (_dir, paths) =
            nginx_fixture("http {\n    autoindex on;\n    server { autoindex off; }\n}\n");
        let ctx = fixture_context_with_runner(paths, MockCommandRunner::new());
        let result = AutoindexDisabled.check(&ctx);
        assert_eq!(result.status, Status::Fail);
        assert!(result.output.contains("autoindex on"));

        let (_dir2, paths2) = nginx_fixture("http {\n    server { autoindex off; }\n}\n");
        let ctx2 = fixture_context_with_runner(paths2, MockCommandRunner::new());
        assert_eq!(AutoindexDisabled.check(&ctx2).status, Status::Pass);
    }

    #[test]
    fn autoindex_check_does_not_mutate_config() {
        let conf = "http {\n    autoindex on;\n}\n";
        let (dir, paths) = nginx_fixture(conf);
        let ctx = fixture_context_with_runner(paths, MockCommandRunner::new());
        let _ = AutoindexDisabled.check(&ctx);
        assert_eq!(fs::read_to_string(dir.path().join("nginx.conf")).unwrap(), conf);
    }

    #[test]
    fn autoindex_remediation_is_idempotent() {
        let (dir, paths) = nginx_fixture("http {\n    autoindex on;\n}\n");
        let ctx = fixture_context_with_runner(paths, MockCommandRunner::new());

        let first = AutoindexDisabled.remediate(&ctx);
        assert_eq!(first.status, Status::Remediated);
        let after_first = fs::read_to_string(dir.path().join("nginx.conf")).unwrap();
        assert!(after_first.contains("autoindex off;"));

        let second = AutoindexDisabled.remediate(&ctx);
        assert_eq!(second.status, Status::Remediated);
        assert!(second.output.contains("No changes needed"));
        assert_eq!(fs::read_to_string(dir.path().join("nginx.conf")).unwrap(), after_first);
    }
}
