use crate::engine::RunContext;
use crate::exec::ExecError;
use crate::model::{Control, ControlResult};
use crate::nginx;
use std::fs;
use std::path::Path;

pub struct DedicatedServiceAccount;
pub struct ServiceAccountLocked;
pub struct ServiceAccountShell;

/// The account the worker processes run as, per the main config's `user`
/// directive. `Ok(None)` means the directive is absent.
fn service_user(ctx: &RunContext) -> Result<Option<String>, String> {
    nginx::main_conf_directive(&ctx.paths, "user").map_err(|e| e.to_string())
}

impl Control for DedicatedServiceAccount {
    fn id(&self) -> &str { "2.2.1" }
    fn title(&self) -> &str {
        "Ensure NGINX is run using a non-privileged, dedicated service account"
    }
    fn description(&self) -> &str {
        "Verify that NGINX worker processes run under a dedicated non-privileged user."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        let user = match nginx::main_conf_directive(&ctx.paths, "user") {
            Ok(Some(user)) => user,
            Ok(None) => {
                return ControlResult::fail(
                    self.id(),
                    format!("No user directive found in {}", ctx.paths.main_conf().display()),
                )
            }
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        };

        let mut findings = vec![format!("User directive in nginx.conf: {}", user)];
        let entry = match nginx::lookup_user(&ctx.paths.passwd_file, &user) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                return ControlResult::fail(self.id(), format!("User {} not found in system", user))
            }
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        };
        findings.push(format!("User {} exists with UID {}", user, entry.uid));
        if entry.uid == 0 {
            return ControlResult::fail(self.id(), format!("User {} is privileged (UID 0)", user));
        }

        let groups = match nginx::groups_of_user(&ctx.paths.group_file, &user, entry.gid) {
            Ok(groups) => groups,
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        };
        match groups.as_slice() {
            [] => {
                findings.push(format!("Primary group (gid {}) not found in group database", entry.gid));
                ControlResult::fail(self.id(), findings.join("\n"))
            }
            [only] => {
                findings.push(format!("User {} only belongs to group {}", user, only));
                ControlResult::pass(self.id(), findings.join("\n"))
            }
            many => {
                findings.push(format!(
                    "User {} belongs to multiple groups: {}",
                    user,
                    many.join(", ")
                ));
                ControlResult::fail(self.id(), findings.join("\n"))
            }
        }
    }

    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        // Create group and user only when absent, then point the config at
        // them; re-running on a compliant system changes nothing.
        match nginx::lookup_group_gid(&ctx.paths.group_file, "nginx") {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(result) = self.run_step(ctx, "groupadd", &["nginx"]) {
                    return result;
                }
            }
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        }
        match nginx::lookup_user(&ctx.paths.passwd_file, "nginx") {
            Ok(Some(_)) => {}
            Ok(None) => {
                let args =
                    ["nginx", "-r", "-g", "nginx", "-d", "/var/cache/nginx", "-s", "/sbin/nologin"];
                if let Err(result) = self.run_step(ctx, "useradd", &args) {
                    return result;
                }
            }
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        }
        if let Err(e) = set_user_directive(&ctx.paths.main_conf()) {
            return ControlResult::error(self.id(), e.to_string());
        }
        let reloaded = nginx::reload_nginx(ctx);
        ControlResult::remediated(
            self.id(),
            format!(
                "Dedicated user 'nginx' ensured and nginx.conf updated{}",
                if reloaded { "; nginx reloaded" } else { "" }
            ),
        )
    }
}

impl DedicatedServiceAccount {
    fn run_step(
        &self,
        ctx: &RunContext,
        program: &str,
        args: &[&str],
    ) -> Result<(), ControlResult> {
        match ctx.command(program, args) {
            Ok(out) if out.success() => Ok(()),
            Ok(out) => Err(ControlResult::error(
                self.id(),
                format!("{} failed: {}", program, out.stderr.trim()),
            )),
            Err(e) => Err(ControlResult::error(self.id(), e.to_string())),
        }
    }
}

/// Point the main config's `user` directive at the nginx account, inserting
/// one at the top when the directive is missing.
fn set_user_directive(conf: &Path) -> anyhow::Result<()> {
    let content = fs::read_to_string(conf)?;
    let mut lines: Vec<String> = Vec::new();
    let mut updated = false;
    for line in content.lines() {
        let trimmed = line.trim_start();
        if !trimmed.starts_with('#') && trimmed.split_whitespace().next() == Some("user") {
            lines.push("user nginx;".to_string());
            updated = true;
        } else {
            lines.push(line.to_string());
        }
    }
    if !updated {
        lines.insert(0, "user nginx;".to_string());
    }
    let mut out = lines.join("\n");
    out.push('\n');
    fs::write(conf, out)?;
    Ok(())
}

impl Control for ServiceAccountLocked {
    fn id(&self) -> &str { "2.2.2" }
    fn title(&self) -> &str { "Ensure the NGINX service account is locked" }
    fn description(&self) -> &str {
        "Verify that the nginx service account is locked to prevent direct logins."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        let user = match service_user(ctx) {
            Ok(Some(user)) => user,
            Ok(None) => {
                return ControlResult::fail(
                    self.id(),
                    format!("No user directive found in {}", ctx.paths.main_conf().display()),
                )
            }
            Err(message) => return ControlResult::error(self.id(), message),
        };
        match ctx.command("passwd", &["-S", &user]) {
            Ok(out) if out.success() => {
                if out.stdout.contains("LK") {
                    ControlResult::pass(self.id(), out.stdout.trim())
                } else {
                    ControlResult::fail(
                        self.id(),
                        format!("User {} is not locked:\n{}", user, out.stdout.trim()),
                    )
                }
            }
            Ok(out) => ControlResult::error(self.id(), out.stderr.trim()),
            Err(ExecError::NotFound(_)) => {
                ControlResult::error(self.id(), "passwd command not found")
            }
            Err(e) => ControlResult::error(self.id(), e.to_string()),
        }
    }

    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        let user = match service_user(ctx) {
            Ok(Some(user)) => user,
            Ok(None) => return ControlResult::error(self.id(), "No nginx user found to lock"),
            Err(message) => return ControlResult::error(self.id(), message),
        };
        match ctx.command("passwd", &["-l", &user]) {
            Ok(out) if out.success() => {
                ControlResult::remediated(self.id(), format!("User {} has been locked", user))
            }
            Ok(out) => ControlResult::error(
                self.id(),
                format!("passwd -l failed: {}", out.stderr.trim()),
            ),
            Err(e) => ControlResult::error(self.id(), e.to_string()),
        }
    }
}

impl Control for ServiceAccountShell {
    fn id(&self) -> &str { "2.2.3" }
    fn title(&self) -> &str { "Ensure the NGINX service account has an invalid shell" }
    fn description(&self) -> &str {
        "Verify that the nginx service account cannot log in by ensuring its shell is /sbin/nologin."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        let user = match service_user(ctx) {
            Ok(Some(user)) => user,
            Ok(None) => {
                return ControlResult::fail(
                    self.id(),
                    format!("No user directive found in {}", ctx.paths.main_conf().display()),
                )
            }
            Err(message) => return ControlResult::error(self.id(), message),
        };
        match nginx::lookup_user(&ctx.paths.passwd_file, &user) {
            Ok(Some(entry)) if entry.shell.contains("nologin") => ControlResult::pass(
                self.id(),
                format!("User {} has invalid shell: {}", user, entry.shell),
            ),
            Ok(Some(entry)) => ControlResult::fail(
                self.id(),
                format!("User {} has a valid shell: {}", user, entry.shell),
            ),
            Ok(None) => ControlResult::fail(self.id(), format!("User {} not found in system", user)),
            Err(e) => ControlResult::error(self.id(), e.to_string()),
        }
    }

    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        let user = match service_user(ctx) {
            Ok(Some(user)) => user,
            Ok(None) => return ControlResult::error(self.id(), "No nginx user found to remediate"),
            Err(message) => return ControlResult::error(self.id(), message),
        };
        match ctx.command("usermod", &["-s", "/sbin/nologin", &user]) {
            Ok(out) if out.success() => ControlResult::remediated(
                self.id(),
                format!("User {} shell set to /sbin/nologin", user),
            ),
            Ok(out) => ControlResult::error(
                self.id(),
                format!("usermod failed: {}", out.stderr.trim()),
            ),
            Err(e) => ControlResult::error(self.id(), e.to_string()),
        }
    }
}
