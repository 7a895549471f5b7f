//! Delivering the generated playbook.

use fs_err as fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

const SAVE_PROMPT: &str = "Enter the file path to save the Ansible playbook (empty to print): ";

#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Saved(PathBuf),
    Printed,
}

/// Writes `playbook` to `target`, or asks for a path when none was given.
///
/// An empty answer (or end of input) prints the playbook to `stdout` instead.
pub fn deliver<R: BufRead, W: Write, O: Write>(
    playbook: &str,
    target: Option<&Path>,
    input: &mut R,
    prompt: &mut W,
    stdout: &mut O,
) -> io::Result<Delivery> {
    let path = match target {
        Some(path) => Some(path.to_path_buf()),
        None => {
            write!(prompt, "{}", SAVE_PROMPT)?;
            prompt.flush()?;
            let mut answer = String::new();
            input.read_line(&mut answer)?;
            let answer = answer.trim();
            (!answer.is_empty()).then(|| PathBuf::from(answer))
        }
    };

    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, playbook)?;
            Ok(Delivery::Saved(path))
        }
        None => {
            stdout.write_all(playbook.as_bytes())?;
            if !playbook.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
            stdout.flush()?;
            Ok(Delivery::Printed)
        }
    }
}
