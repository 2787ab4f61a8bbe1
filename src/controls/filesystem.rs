use crate::engine::RunContext;
use crate::model::{Control, ControlResult};
use crate::nginx;
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use walkdir::WalkDir;

pub struct RootOwnership;
pub struct RestrictedPermissions;
pub struct PidFileSecured;
pub struct CoreDumpDirSecured;

impl Control for RootOwnership {
    fn id(&self) -> &str { "2.3.1" }
    fn title(&self) -> &str { "Ensure NGINX directories and files are owned by root" }
    fn description(&self) -> &str {
        "Verify that the NGINX configuration tree and its files are owned by root:root."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        let conf_dir = &ctx.paths.conf_dir;
        if !conf_dir.exists() {
            return ControlResult::fail(self.id(), format!("{} does not exist", conf_dir.display()));
        }
        let mut findings = Vec::new();
        for entry in WalkDir::new(conf_dir).min_depth(1) {
            match entry {
                Ok(entry) => match entry.metadata() {
                    Ok(meta) => {
                        if meta.uid() != 0 || meta.gid() != 0 {
                            findings.push(format!(
                                "{} owned by {}:{}",
                                entry.path().display(),
                                meta.uid(),
                                meta.gid()
                            ));
                        }
                    }
                    Err(e) => findings.push(format!("Error checking {}: {}", entry.path().display(), e)),
                },
                Err(e) => findings.push(format!("Error walking {}: {}", conf_dir.display(), e)),
            }
        }
        if findings.is_empty() {
            ControlResult::pass(
                self.id(),
                format!("All files in {} are owned by root:root", conf_dir.display()),
            )
        } else {
            ControlResult::fail(
                self.id(),
                format!("Non-root ownership found:\n{}", findings.join("\n")),
            )
        }
    }

    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        let conf_dir = ctx.paths.conf_dir.display().to_string();
        match ctx.command("chown", &["-R", "root:root", &conf_dir]) {
            Ok(out) if out.success() => ControlResult::remediated(
                self.id(),
                format!("Ownership of {} set to root:root", conf_dir),
            ),
            Ok(out) => ControlResult::error(
                self.id(),
                format!("chown failed: {}", out.stderr.trim()),
            ),
            Err(e) => ControlResult::error(self.id(), e.to_string()),
        }
    }
}

const DIR_MODE_LIMIT: u32 = 0o755;
const FILE_MODE_LIMIT: u32 = 0o660;

impl Control for RestrictedPermissions {
    fn id(&self) -> &str { "2.3.2" }
    fn title(&self) -> &str { "Ensure access to NGINX directories and files is restricted" }
    fn description(&self) -> &str {
        "Verify that the NGINX configuration tree follows the least privilege principle."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        let conf_dir = &ctx.paths.conf_dir;
        if !conf_dir.exists() {
            return ControlResult::fail(self.id(), format!("{} does not exist", conf_dir.display()));
        }
        let mut findings = Vec::new();
        for entry in WalkDir::new(conf_dir).min_depth(1).into_iter().filter_map(Result::ok) {
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    findings.push(format!("Error checking {}: {}", entry.path().display(), e));
                    continue;
                }
            };
            let mode = meta.permissions().mode() & 0o7777;
            if meta.is_dir() && mode > DIR_MODE_LIMIT {
                findings.push(format!(
                    "Directory {} has insecure permissions: {:o}",
                    entry.path().display(),
                    mode
                ));
            } else if meta.is_file() && mode > FILE_MODE_LIMIT {
                findings.push(format!(
                    "File {} has insecure permissions: {:o}",
                    entry.path().display(),
                    mode
                ));
            }
        }
        if findings.is_empty() {
            ControlResult::pass(
                self.id(),
                "All NGINX directories and files comply with least privilege",
            )
        } else {
            ControlResult::fail(self.id(), findings.join("\n"))
        }
    }

    /// Directories lose group/other write; files lose user/group execute and
    /// all other access. Entries already compliant are left alone.
    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        let conf_dir = &ctx.paths.conf_dir;
        if !conf_dir.exists() {
            return ControlResult::error(self.id(), format!("{} does not exist", conf_dir.display()));
        }
        let mut adjusted = 0usize;
        for entry in WalkDir::new(conf_dir).min_depth(1).into_iter().filter_map(Result::ok) {
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => return ControlResult::error(self.id(), e.to_string()),
            };
            let mode = meta.permissions().mode() & 0o7777;
            let wanted = if meta.is_dir() { mode & !0o022 } else { mode & !0o117 };
            if wanted != mode {
                if let Err(e) =
                    fs::set_permissions(entry.path(), fs::Permissions::from_mode(wanted))
                {
                    return ControlResult::error(
                        self.id(),
                        format!("chmod {} failed: {}", entry.path().display(), e),
                    );
                }
                adjusted += 1;
            }
        }
        let output = if adjusted == 0 {
            "No changes needed (permissions already restricted)".to_string()
        } else {
            format!("Permissions adjusted on {} entries under {}", adjusted, conf_dir.display())
        };
        ControlResult::remediated(self.id(), output)
    }
}

impl Control for PidFileSecured {
    fn id(&self) -> &str { "2.3.3" }
    fn title(&self) -> &str { "Ensure the NGINX process ID (PID) file is secured" }
    fn description(&self) -> &str {
        "Verify that the nginx PID file is owned by root:root with permissions 644."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        let pid_file = &ctx.paths.pid_file;
        if !pid_file.exists() {
            return ControlResult::fail(self.id(), format!("{} does not exist", pid_file.display()));
        }
        let meta = match fs::metadata(pid_file) {
            Ok(meta) => meta,
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        };
        let mode = meta.permissions().mode() & 0o7777;
        let mut findings = Vec::new();
        if meta.uid() != 0 || meta.gid() != 0 {
            findings.push(format!(
                "Owner/Group is {}:{}, expected root:root",
                meta.uid(),
                meta.gid()
            ));
        }
        if mode != 0o644 {
            findings.push(format!("Permissions are {:o}, expected 644", mode));
        }
        if findings.is_empty() {
            ControlResult::pass(
                self.id(),
                format!("{} is properly secured (owner root:root, perms 644)", pid_file.display()),
            )
        } else {
            ControlResult::fail(self.id(), findings.join("\n"))
        }
    }

    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        let pid_file = &ctx.paths.pid_file;
        if !pid_file.exists() {
            return ControlResult::error(self.id(), format!("{} not found", pid_file.display()));
        }
        if let Err(e) = std::os::unix::fs::chown(pid_file, Some(0), Some(0)) {
            return ControlResult::error(self.id(), format!("chown failed: {}", e));
        }
        if let Err(e) = fs::set_permissions(pid_file, fs::Permissions::from_mode(0o644)) {
            return ControlResult::error(self.id(), format!("chmod failed: {}", e));
        }
        ControlResult::remediated(
            self.id(),
            format!("{} ownership set to root:root and permissions set to 644", pid_file.display()),
        )
    }
}

impl Control for CoreDumpDirSecured {
    fn id(&self) -> &str { "2.3.4" }
    fn title(&self) -> &str { "Ensure the core dump directory is secured" }
    fn description(&self) -> &str {
        "Verify that the working_directory directive, when set, points at a secured directory."
    }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        let wdir = match nginx::main_conf_directive(&ctx.paths, "working_directory") {
            Ok(Some(wdir)) => wdir,
            Ok(None) => {
                return ControlResult::pass(
                    self.id(),
                    "No working_directory directive found (default: disabled)",
                )
            }
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        };
        let wdir = Path::new(&wdir);
        if !wdir.exists() {
            return ControlResult::fail(
                self.id(),
                format!("Configured working_directory {} does not exist", wdir.display()),
            );
        }
        let meta = match fs::metadata(wdir) {
            Ok(meta) => meta,
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        };
        let mode = meta.permissions().mode() & 0o7777;
        let mut findings = Vec::new();
        if meta.uid() != 0 {
            findings.push(format!("Owner is uid {}, expected root", meta.uid()));
        }
        match nginx::group_name_of_gid(&ctx.paths.group_file, meta.gid()) {
            Ok(Some(group)) if group == "nginx" => {}
            Ok(Some(group)) => findings.push(format!("Group is {}, expected nginx", group)),
            Ok(None) => findings.push(format!("Group gid {} not found, expected nginx", meta.gid())),
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        }
        if mode & 0o007 != 0 {
            findings.push(format!(
                "Directory {} has others permissions: {:o}",
                wdir.display(),
                mode
            ));
        }
        if findings.is_empty() {
            ControlResult::pass(
                self.id(),
                format!("working_directory {} is properly secured", wdir.display()),
            )
        } else {
            ControlResult::fail(self.id(), findings.join("\n"))
        }
    }

    fn remediate(&self, ctx: &RunContext) -> ControlResult {
        let wdir = match nginx::main_conf_directive(&ctx.paths, "working_directory") {
            Ok(Some(wdir)) => wdir,
            // Nothing configured means nothing to secure; the no-op keeps
            // remediation idempotent.
            Ok(None) => {
                return ControlResult::remediated(
                    self.id(),
                    "No working_directory directive found (nothing to remediate)",
                )
            }
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        };
        let wdir = Path::new(&wdir);
        if !wdir.exists() {
            return ControlResult::error(
                self.id(),
                format!("Configured working_directory {} does not exist", wdir.display()),
            );
        }
        let gid = match nginx::lookup_group_gid(&ctx.paths.group_file, "nginx") {
            Ok(Some(gid)) => gid,
            Ok(None) => return ControlResult::error(self.id(), "group nginx not found"),
            Err(e) => return ControlResult::error(self.id(), e.to_string()),
        };
        if let Err(e) = std::os::unix::fs::chown(wdir, Some(0), Some(gid)) {
            return ControlResult::error(self.id(), format!("chown failed: {}", e));
        }
        if let Err(e) = fs::set_permissions(wdir, fs::Permissions::from_mode(0o750)) {
            return ControlResult::error(self.id(), format!("chmod failed: {}", e));
        }
        ControlResult::remediated(
            self.id(),
            format!("working_directory {} secured (owner root:nginx, perms 750)", wdir.display()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::mock::MockCommandRunner;
    use crate::model::Status;
    use crate::test_helpers::{fixture_context, fixture_context_with_runner, nginx_fixture};

    #[test]
    fn missing_conf_dir_fails_ownership_check() {
        let (dir, mut paths) = nginx_fixture("user nginx;\n");
        paths.conf_dir = dir.path().join("missing");
        let ctx = fixture_context(paths);
        let result = RootOwnership.check(&ctx);
        assert_eq!(result.status, Status::Fail);
        assert!(result.output.contains("does not exist"));
    }

    #[test]
    fn ownership_remediation_shells_out_to_chown() {
        let (_dir, paths) = nginx_fixture("user nginx;\n");
        let runner = MockCommandRunner::new();
        let ctx = fixture_context_with_runner(paths, runner);
        let result = RootOwnership.remediate(&ctx);
        assert_eq!(result.status, Status::Remediated);
    }

    #[test]
    fn overly_open_file_fails_permission_check() {
        let (dir, paths) = nginx_fixture("user nginx;\n");
        let open_file = dir.path().join("secrets.conf");
        fs::write(&open_file, "token abc;\n").unwrap();
        fs::set_permissions(&open_file, fs::Permissions::from_mode(0o666)).unwrap();
        let ctx = fixture_context(paths);
        let result = RestrictedPermissions.check(&ctx);
        assert_eq!(result.status, Status::Fail);
        assert!(result.output.contains("secrets.conf"));
    }

    #[test]
    fn permission_remediation_restricts_and_then_passes() {
        let (dir, paths) = nginx_fixture("user nginx;\n");
        let open_file = dir.path().join("site.conf");
        fs::write(&open_file, "server {}\n").unwrap();
        fs::set_permissions(&open_file, fs::Permissions::from_mode(0o777)).unwrap();
        fs::set_permissions(dir.path().join("nginx.conf"), fs::Permissions::from_mode(0o640))
            .unwrap();
        let ctx = fixture_context(paths);

        let first = RestrictedPermissions.remediate(&ctx);
        assert_eq!(first.status, Status::Remediated);
        let mode = fs::metadata(&open_file).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o660);
        assert_eq!(RestrictedPermissions.check(&ctx).status, Status::Pass);

        let second = RestrictedPermissions.remediate(&ctx);
        assert_eq!(second.status, Status::Remediated);
        assert!(second.output.contains("No changes needed"));
    }

    #[test]
    fn permission_check_does_not_alter_modes() {
        let (dir, paths) = nginx_fixture("user nginx;\n");
        let open_file = dir.path().join("site.conf");
        fs::write(&open_file, "server {}\n").unwrap();
        fs::set_permissions(&open_file, fs::Permissions::from_mode(0o666)).unwrap();
        let ctx = fixture_context(paths);
        let _ = RestrictedPermissions.check(&ctx);
        let mode = fs::metadata(&open_file).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o666);
    }

    #[test]
    fn missing_pid_file_fails_check_and_errors_remediation() {
        let (_dir, paths) = nginx_fixture("user nginx;\n");
        let ctx = fixture_context(paths);
        assert_eq!(PidFileSecured.check(&ctx).status, Status::Fail);
        assert_eq!(PidFileSecured.remediate(&ctx).status, Status::Error);
    }

    #[test]
    fn wrong_pid_file_mode_is_flagged() {
        let (dir, paths) = nginx_fixture("user nginx;\n");
        fs::write(dir.path().join("nginx.pid"), "1234\n").unwrap();
        fs::set_permissions(dir.path().join("nginx.pid"), fs::Permissions::from_mode(0o600))
            .unwrap();
        let ctx = fixture_context(paths);
        let result = PidFileSecured.check(&ctx);
        assert_eq!(result.status, Status::Fail);
        assert!(result.output.contains("Permissions are 600"));
    }

    #[test]
    fn absent_working_directory_passes_and_remediation_is_a_noop() {
        let (_dir, paths) = nginx_fixture("user nginx;\n");
        let ctx = fixture_context(paths);
        assert_eq!(CoreDumpDirSecured.check(&ctx).status, Status::Pass);
        let result = CoreDumpDirSecured.remediate(&ctx);
        assert_eq!(result.status, Status::Remediated);
        assert!(result.output.contains("nothing to remediate"));
    }

    #[test]
    fn world_accessible_core_dump_dir_fails() {
        let (dir, paths) = nginx_fixture("");
        let wdir = dir.path().join("coredumps");
        fs::create_dir(&wdir).unwrap();
        fs::set_permissions(&wdir, fs::Permissions::from_mode(0o757)).unwrap();
        fs::write(
            dir.path().join("nginx.conf"),
            format!("user nginx;\nworking_directory {};\n", wdir.display()),
        )
        .unwrap();
        fs::write(&paths.group_file, "root:x:0:\nnginx:x:990:\n").unwrap();
        let ctx = fixture_context(paths);
        let result = CoreDumpDirSecured.check(&ctx);
        assert_eq!(result.status, Status::Fail);
        assert!(result.output.contains("others permissions"));
    }

    #[test]
    fn nonexistent_working_directory_fails() {
        let (dir, paths) = nginx_fixture("");
        fs::write(
            dir.path().join("nginx.conf"),
            format!("working_directory {};\n", dir.path().join("gone").display()),
        )
        .unwrap();
        fs::write(&paths.group_file, "nginx:x:990:\n").unwrap();
        let ctx = fixture_context(paths);
        let result = CoreDumpDirSecured.check(&ctx);
        assert_eq!(result.status, Status::Fail);
        assert!(result.output.contains("does not exist"));
        assert_eq!(CoreDumpDirSecured.remediate(&ctx).status, Status::Error);
    }
}
