//! Shell command lines for compress, extract and run.
//!
//! POSIX servers get `sh` syntax with single-quoted arguments; Windows
//! servers get `cmd` lines that hand archive work to PowerShell.

use turbofile_core::{OsType, RemotePath};

use crate::backend::{BackendError, BackendResult};

/// Quotes `s` as a single `sh` word.
pub fn sh_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Escapes `s` for use inside a PowerShell single-quoted literal.
pub fn pwsh_literal(s: &str) -> String {
    s.replace('\'', "''")
}

fn cmd_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\\\""))
}

fn powershell(script: &str) -> String {
    format!("powershell -NoProfile -Command \"{script}\"")
}

/// Archive formats `extract_command` understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
}

impl ArchiveKind {
    pub fn detect(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if [".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tar.xz"]
            .iter()
            .any(|ext| lower.ends_with(ext))
        {
            Some(ArchiveKind::Tar)
        } else {
            None
        }
    }
}

/// Where `compress_command` writes its archive: `<name>.zip` next to `path`.
pub fn archive_path(path: &RemotePath) -> RemotePath {
    path.parent().join(&format!("{}.zip", path.file_name()))
}

pub fn compress_command(os: OsType, path: &RemotePath) -> BackendResult<String> {
    if path.is_root() {
        return Err(BackendError::Unsupported("cannot compress a root directory".into()));
    }
    let target = archive_path(path);
    Ok(match os {
        OsType::Windows => powershell(&format!(
            "Compress-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
            pwsh_literal(&path.to_native(os)),
            pwsh_literal(&target.to_native(os)),
        )),
        OsType::Posix => format!(
            "cd {} && zip -r -q {} {}",
            sh_quote(path.parent().as_str()),
            sh_quote(target.file_name()),
            sh_quote(path.file_name()),
        ),
    })
}

/// Extracts into the archive's own directory.
pub fn extract_command(os: OsType, path: &RemotePath) -> BackendResult<String> {
    let dest = path.parent();
    let kind = ArchiveKind::detect(path.file_name())
        .ok_or_else(|| BackendError::Unsupported(format!("unsupported archive format: {}", path.file_name())))?;
    Ok(match (os, kind) {
        (OsType::Windows, ArchiveKind::Zip) => powershell(&format!(
            "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
            pwsh_literal(&path.to_native(os)),
            pwsh_literal(&dest.to_native(os)),
        )),
        (OsType::Windows, ArchiveKind::Tar) => format!(
            "tar -xf {} -C {}",
            cmd_quote(&path.to_native(os)),
            cmd_quote(&dest.to_native(os)),
        ),
        (OsType::Posix, ArchiveKind::Zip) => format!(
            "unzip -o {} -d {}",
            sh_quote(path.as_str()),
            sh_quote(dest.as_str()),
        ),
        (OsType::Posix, ArchiveKind::Tar) => format!(
            "tar -xf {} -C {}",
            sh_quote(path.as_str()),
            sh_quote(dest.as_str()),
        ),
    })
}

/// Runs a `.py` or `.sh` script from its own directory with unbuffered output.
pub fn run_command(os: OsType, path: &RemotePath) -> BackendResult<String> {
    let name = path.file_name();
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    let dir = path.parent();
    match (ext.as_str(), os) {
        ("py", OsType::Posix) => Ok(format!(
            "cd {dir} && (python3 -u {script} || python -u {script})",
            dir = sh_quote(dir.as_str()),
            script = sh_quote(name),
        )),
        ("py", OsType::Windows) => Ok(format!(
            "cd /d {} && python -u {}",
            cmd_quote(&dir.to_native(os)),
            cmd_quote(name),
        )),
        ("sh", OsType::Posix) => Ok(format!(
            "cd {} && bash {}",
            sh_quote(dir.as_str()),
            sh_quote(name),
        )),
        ("sh", OsType::Windows) => Err(BackendError::Unsupported(
            "shell scripts cannot run on Windows servers".into(),
        )),
        _ => Err(BackendError::Unsupported("only .py and .sh files can be run".into())),
    }
}
