use crate::engine::RunContext;
use crate::exec::ExecError;
use crate::model::{Control, ControlResult};

pub struct NginxInstalled;
pub struct NginxFromSource;

/// `nginx -v` prints its version banner to stderr, not stdout.
fn nginx_version_probe(id: &str, ctx: &RunContext) -> ControlResult {
    match ctx.command("nginx", &["-v"]) {
        Ok(out) if out.success() && out.stderr.to_lowercase().contains("nginx") => {
            ControlResult::pass(id, out.stderr.trim())
        }
        Ok(_) => ControlResult::fail(id, "nginx not detected"),
        Err(ExecError::NotFound(_)) => ControlResult::fail(id, "nginx command not found"),
        Err(e) => ControlResult::error(id, e.to_string()),
    }
}

impl Control for NginxInstalled {
    fn id(&self) -> &str { "1.1.1" }
    fn title(&self) -> &str { "Ensure NGINX is installed" }
    fn description(&self) -> &str { "Verify that NGINX is installed on the system." }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        nginx_version_probe(self.id(), ctx)
    }

    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        match ctx.command("dnf", &["install", "-y", "nginx"]) {
            Ok(out) if out.success() => {
                ControlResult::remediated(self.id(), "nginx installed via dnf")
            }
            Ok(out) => ControlResult::error(
                self.id(),
                format!("dnf install failed: {}", out.stderr.trim()),
            ),
            Err(e) => ControlResult::error(self.id(), e.to_string()),
        }
    }
}

impl Control for NginxFromSource {
    fn id(&self) -> &str { "1.1.2" }
    fn title(&self) -> &str { "Ensure NGINX is installed from source" }
    fn description(&self) -> &str {
        "Verify that NGINX is installed from source and not from the package manager."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        nginx_version_probe(self.id(), ctx)
    }

    // A source build cannot complete inside the per-command timeout, so this
    // stays a guided manual step.
    fn remediate(&self, _ctx: &RunContext) -> ControlResult {
        ControlResult::manual(
            self.id(),
            "Build and install NGINX from source:\n\
             \x20 dnf install -y gcc make wget tar zlib-devel pcre-devel openssl-devel\n\
             \x20 wget http://nginx.org/download/nginx-1.26.1.tar.gz -O /tmp/nginx.tar.gz\n\
             \x20 tar -xf /tmp/nginx.tar.gz -C /tmp\n\
             \x20 cd /tmp/nginx-1.26.1 && ./configure --with-http_ssl_module --without-http_autoindex_module\n\
             \x20 make && make install",
        )
    }
}
