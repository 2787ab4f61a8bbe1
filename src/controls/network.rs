use crate::engine::RunContext;
use crate::exec::ExecError;
use crate::model::{Control, ControlResult};
use crate::nginx;

pub struct AuthorizedPorts;
pub struct UnknownHostRejected;
pub struct KeepaliveTimeout;
pub struct SendTimeout;

impl Control for AuthorizedPorts {
    fn id(&self) -> &str { "2.4.1" }
    fn title(&self) -> &str {
        "Ensure NGINX only listens for network connections on authorized ports"
    }
    fn description(&self) -> &str {
        "Verify that NGINX is only listening on authorized ports."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        let hits = match nginx::scan_numeric_directive(&ctx.paths, "listen") {
            Ok(hits) => hits,
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        };
        let unauthorized: Vec<String> = hits
            .iter()
            .filter(|hit| !ctx.authorized_ports.iter().any(|p| u64::from(*p) == hit.value))
            .map(|hit| format!("{}: {}", hit.file.display(), hit.line))
            .collect();
        if unauthorized.is_empty() {
            let ports = ctx
                .authorized_ports
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            ControlResult::pass(
                self.id(),
                format!("All listening ports are authorized ({})", ports),
            )
        } else {
            ControlResult::fail(
                self.id(),
                format!("Found unauthorized listening ports:\n{}", unauthorized.join("\n")),
            )
        }
    }

    fn remediate(&self, _ctx: &RunContext) -> ControlResult {
        ControlResult::manual(
            self.id(),
            "Edit the NGINX configuration files, remove or comment out unauthorized \
             listen directives, then run: systemctl reload nginx",
        )
    }
}

impl Control for UnknownHostRejected {
    fn id(&self) -> &str { "2.4.2" }
    fn title(&self) -> &str { "Ensure requests for unknown host names are rejected" }
    fn description(&self) -> &str {
        "Verify that NGINX rejects requests carrying an unknown Host header."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        let probe = ctx.command(
            "curl",
            &[
                "-k",
                "-o",
                "/dev/null",
                "-s",
                "-w",
                "%{http_code}",
                "https://127.0.0.1",
                "-H",
                "Host: invalid.host.com",
            ],
        );
        let http_code = match probe {
            Ok(out) => out.stdout.trim().to_string(),
            Err(ExecError::NotFound(_)) => {
                return ControlResult::error(self.id(), "curl not found")
            }
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        };
        let missing = match nginx::server_blocks_missing_name(&ctx.paths) {
            Ok(missing) => missing,
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        };
        let missing_display: Vec<String> =
            missing.iter().map(|p| p.display().to_string()).collect();
        let details = serde_json::json!({
            "http_code": http_code,
            "missing_server_name": missing_display,
        });
        if http_code.starts_with('4') && missing.is_empty() {
            ControlResult::pass(
                self.id(),
                format!(
                    "NGINX returned {} for an unknown host and all server blocks define server_name",
                    http_code
                ),
            )
            .with_details(details)
        } else {
            ControlResult::fail(
                self.id(),
                format!(
                    "NGINX returned {} for an unknown host; server blocks without server_name: {}",
                    http_code,
                    if missing_display.is_empty() { "none".to_string() } else { missing_display.join(", ") }
                ),
            )
            .with_details(details)
        }
    }

    fn remediate(&self, _ctx: &RunContext) -> ControlResult {
        ControlResult::manual(
            self.id(),
            "Add a default catch-all server block:\n\
             server {\n\
             \x20   return 404;\n\
             }\n\n\
             Ensure every server block has an explicit server_name directive.",
        )
    }
}

/// 2.4.3 and 2.4.4 audit the same shape of directive with the same bounds;
/// only the directive name and the default-value note differ.
fn check_bounded_timeout(
    id: &str,
    ctx: &RunContext,
    directive: &str,
    unset_note: &str,
) -> ControlResult {
    let hits = match nginx::scan_numeric_directive(&ctx.paths, directive) {
        Ok(hits) => hits,
        Err(e) => return ControlResult::error(id, e.to_string()),
    };
    if hits.is_empty() {
        return ControlResult::fail(id, format!("{} not set ({})", directive, unset_note));
    }
    let invalid: Vec<String> = hits
        .iter()
        .filter(|hit| hit.value == 0 || hit.value > 10)
        .map(|hit| format!("{}: {}", hit.file.display(), hit.line))
        .collect();
    if invalid.is_empty() {
        ControlResult::pass(id, format!("All {} values are <= 10 and not 0", directive))
    } else {
        ControlResult::fail(id, format!("Invalid {} found:\n{}", directive, invalid.join("\n")))
    }
}

fn remediate_bounded_timeout(id: &str, ctx: &RunContext, directive: &str) -> ControlResult {
    let conf = ctx.paths.main_conf();
    if !conf.exists() {
        return ControlResult::error(id, format!("{} not found", conf.display()));
    }
    match nginx::set_http_directive(&conf, directive, "10") {
        Ok(true) => {
            let reloaded = nginx::reload_nginx(ctx);
            ControlResult::remediated(
                id,
                format!(
                    "{} set to 10 in {}{}",
                    directive,
                    conf.display(),
                    if reloaded { " and nginx reloaded" } else { "; nginx reload failed, reload manually" }
                ),
            )
        }
        Ok(false) => ControlResult::error(
            id,
            format!("no active {} directive and no http block to insert into", directive),
        ),
        Err(e) => ControlResult::error(id, e.to_string()),
    }
}

impl Control for KeepaliveTimeout {
    fn id(&self) -> &str { "2.4.3" }
    fn title(&self) -> &str {
        "Ensure keepalive_timeout is 10 seconds or less, but not 0"
    }
    fn description(&self) -> &str {
        "Verify that keepalive_timeout is configured correctly in the NGINX configuration."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        check_bounded_timeout(
            self.id(),
            ctx,
            "keepalive_timeout",
            "defaults to browser-controlled, insecure",
        )
    }

    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        remediate_bounded_timeout(self.id(), ctx, "keepalive_timeout")
    }
}

impl Control for SendTimeout {
    fn id(&self) -> &str { "2.4.4" }
    fn title(&self) -> &str { "Ensure send_timeout is set to 10 seconds or less, but not 0" }
    fn description(&self) -> &str {
        "Verify that send_timeout is configured correctly in the NGINX configuration."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        check_bounded_timeout(self.id(), ctx, "send_timeout", "defaults to 60s, insecure")
    }

    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        remediate_bounded_timeout(self.id(), ctx, "send_timeout")
    }
}
