use crate::engine::{Paths, RunContext};
use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// The configuration files a directive scan covers: the main nginx.conf plus
/// every conf.d/*.conf, existing files only.
pub fn conf_files(paths: &Paths) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let main = paths.main_conf();
    if main.exists() {
        files.push(main);
    }
    if let Ok(entries) = glob::glob(&paths.conf_d_pattern()) {
        for entry in entries.flatten() {
            files.push(entry);
        }
    }
    files
}

/// One occurrence of a numeric directive in a config file.
#[derive(Debug, Clone)]
pub struct DirectiveHit {
    pub file: PathBuf,
    pub value: u64,
    pub line: String,
}

/// Scan all config files for `<directive> <number>` occurrences.
pub fn scan_numeric_directive(paths: &Paths, directive: &str) -> Result<Vec<DirectiveHit>> {
    let pattern = Regex::new(&format!(r"{}\s+(\d+)", regex::escape(directive)))?;
    let mut hits = Vec::new();
    for file in conf_files(paths) {
        let content = read_conf(&file)?;
        for line in content.lines() {
            if let Some(caps) = pattern.captures(line) {
                hits.push(DirectiveHit {
                    file: file.clone(),
                    value: caps[1].parse()?,
                    line: line.trim().to_string(),
                });
            }
        }
    }
    Ok(hits)
}

/// Lines across all config files containing `needle` (case-insensitive).
pub fn scan_matching_lines(paths: &Paths, needle: &str) -> Result<Vec<(PathBuf, String)>> {
    let needle = needle.to_lowercase();
    let mut hits = Vec::new();
    for file in conf_files(paths) {
        let content = read_conf(&file)?;
        for line in content.lines() {
            if line.to_lowercase().contains(&needle) {
                hits.push((file.clone(), line.trim().to_string()));
            }
        }
    }
    Ok(hits)
}

/// First argument of the first active `<name>` directive in the main config,
/// e.g. `user nginx;` -> `nginx`. Comments are ignored.
pub fn main_conf_directive(paths: &Paths, name: &str) -> Result<Option<String>> {
    let main = paths.main_conf();
    let content = read_conf(&main)?;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        if parts.next() == Some(name) {
            if let Some(value) = parts.next() {
                return Ok(Some(value.trim_end_matches(';').to_string()));
            }
        }
    }
    Ok(None)
}

/// Replace every active line carrying `name` with `<name> <value>;`, or insert
/// the directive right after the `http {` opener when it is absent. Returns
/// false when there was neither an existing directive nor an http block to
/// insert into, in which case the file is left untouched.
pub fn set_http_directive(conf: &Path, name: &str, value: &str) -> Result<bool> {
    let content = read_conf(conf)?;
    let replacement = format!("    {} {};", name, value);
    let mut lines: Vec<String> = Vec::new();
    let mut updated = false;
    for line in content.lines() {
        if line.contains(name) && !line.trim_start().starts_with('#') {
            lines.push(replacement.clone());
            updated = true;
        } else {
            lines.push(line.to_string());
        }
    }
    if !updated {
        if let Some(pos) = lines.iter().position(|l| l.trim_start().starts_with("http {")) {
            lines.insert(pos + 1, replacement);
            updated = true;
        }
    }
    if updated {
        let mut out = lines.join("\n");
        out.push('\n');
        fs::write(conf, out).with_context(|| format!("writing {}", conf.display()))?;
    }
    Ok(updated)
}

/// Rewrite `autoindex on` lines to `autoindex off` across all config files.
/// Returns a change description per modified line.
pub fn disable_autoindex(paths: &Paths) -> Result<Vec<String>> {
    let mut changes = Vec::new();
    for file in conf_files(paths) {
        let content = read_conf(&file)?;
        let mut lines: Vec<String> = Vec::new();
        let mut modified = false;
        for line in content.lines() {
            if line.to_lowercase().contains("autoindex on") {
                lines.push("    autoindex off;".to_string());
                modified = true;
                changes.push(format!("{}: {} -> autoindex off;", file.display(), line.trim()));
            } else {
                lines.push(line.to_string());
            }
        }
        if modified {
            let mut out = lines.join("\n");
            out.push('\n');
            fs::write(&file, out).with_context(|| format!("writing {}", file.display()))?;
        }
    }
    Ok(changes)
}

/// Config files containing a `server { ... }` block with no `server_name`.
pub fn server_blocks_missing_name(paths: &Paths) -> Result<Vec<PathBuf>> {
    let block_pattern = Regex::new(r"(?s)server\s*\{.*?\}")?;
    let mut missing = Vec::new();
    for file in conf_files(paths) {
        let content = read_conf(&file)?;
        for block in block_pattern.find_iter(&content) {
            if !block.as_str().contains("server_name") {
                missing.push(file.clone());
                break;
            }
        }
    }
    Ok(missing)
}

fn read_conf(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// A parsed /etc/passwd entry, the fields the account controls care about.
#[derive(Debug, Clone, PartialEq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub shell: String,
}

pub fn lookup_user(passwd_file: &Path, name: &str) -> Result<Option<PasswdEntry>> {
    let content = fs::read_to_string(passwd_file)
        .with_context(|| format!("reading {}", passwd_file.display()))?;
    for line in content.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 7 || fields[0] != name {
            continue;
        }
        return Ok(Some(PasswdEntry {
            name: fields[0].to_string(),
            uid: fields[2].parse().with_context(|| format!("uid of {}", name))?,
            gid: fields[3].parse().with_context(|| format!("gid of {}", name))?,
            shell: fields[6].to_string(),
        }));
    }
    Ok(None)
}

pub fn lookup_group_gid(group_file: &Path, name: &str) -> Result<Option<u32>> {
    let content = fs::read_to_string(group_file)
        .with_context(|| format!("reading {}", group_file.display()))?;
    for line in content.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() >= 3 && fields[0] == name {
            return Ok(Some(fields[2].parse().with_context(|| format!("gid of group {}", name))?));
        }
    }
    Ok(None)
}

pub fn group_name_of_gid(group_file: &Path, gid: u32) -> Result<Option<String>> {
    let content = fs::read_to_string(group_file)
        .with_context(|| format!("reading {}", group_file.display()))?;
    for line in content.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() >= 3 && fields[2].parse::<u32>().ok() == Some(gid) {
            return Ok(Some(fields[0].to_string()));
        }
    }
    Ok(None)
}

/// All groups `user` belongs to: its primary group plus any group listing it
/// as a supplementary member.
pub fn groups_of_user(group_file: &Path, user: &str, primary_gid: u32) -> Result<Vec<String>> {
    let content = fs::read_to_string(group_file)
        .with_context(|| format!("reading {}", group_file.display()))?;
    let mut groups = Vec::new();
    for line in content.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 3 {
            continue;
        }
        let is_primary = fields[2].parse::<u32>().ok() == Some(primary_gid);
        let is_member = fields
            .get(3)
            .map(|members| members.split(',').any(|m| m == user))
            .unwrap_or(false);
        if is_primary || is_member {
            groups.push(fields[0].to_string());
        }
    }
    Ok(groups)
}

/// Best-effort config reload; remediations report the result but do not fail
/// on it (the fix itself already landed on disk).
pub fn reload_nginx(ctx: &RunContext) -> bool {
    matches!(ctx.command("systemctl", &["reload", "nginx"]), Ok(out) if out.success())
}
