//! Command interception on the user-facing side of the PTY.
//!
//! With the terminal in raw mode, keystrokes reach us a few bytes at a time. [`LineAssembler`]
//! rebuilds command lines from that stream; [`CommandInterceptor::observe`] decides what gets
//! recorded.
//!
//! ## Accepted imprecision
//!
//! - The self-filter is a substring match against the configured list (default: `orcai`), so
//!   `vim orcai-notes.txt` is dropped and an alias that runs orcai is kept.
//! - Line editing is approximated: backspace, Ctrl-U and Ctrl-C are honoured, escape
//!   sequences (arrow keys, bracketed paste markers) are dropped, tab completion is invisible.
//! - ESC followed by anything other than `[` or `O` is taken as an Alt chord and swallowed
//!   together with that character, so Alt-key shortcuts never appear in recorded lines.
//! - Bytes that are not valid UTF-8 are recorded as U+FFFD. A character split across two
//!   reads is held back until its remaining bytes arrive.
//! - Script detection checks the literal line against this process's working directory, not
//!   the shell's, so scripts run after a `cd` are missed.

use crate::config::CaptureSettings;
use crate::script::ScriptCapture;
use crate::transcript::CaptureLog;
use std::path::Path;
use tracing::debug;

const BACKSPACE: char = '\x08';
const DELETE: char = '\x7f';
const ESCAPE: char = '\x1b';
const CTRL_C: char = '\x03';
const CTRL_U: char = '\x15';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Escape {
    #[default]
    Ground,
    Start,
    Csi,
    Ss3,
}

/// Incremental UTF-8 decoding of terminal input.
///
/// An incomplete sequence at the end of a chunk is kept for the next one; only bytes that can
/// never become valid are replaced.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut decoded = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    decoded.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    // `valid_up_to` bounds a prefix that is already known to be UTF-8.
                    decoded.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        decoded
    }
}

/// Reassembles typed lines from raw terminal input.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: String,
    escape: Escape,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a decoded input chunk and returns every line it completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let mut completed = Vec::new();

        for ch in chunk.chars() {
            match self.escape {
                Escape::Start => {
                    self.escape = match ch {
                        '[' => Escape::Csi,
                        'O' => Escape::Ss3,
                        _ => Escape::Ground,
                    };
                    continue;
                }
                Escape::Csi => {
                    // Final byte of a control sequence.
                    if ('\x40'..='\x7e').contains(&ch) {
                        self.escape = Escape::Ground;
                    }
                    continue;
                }
                Escape::Ss3 => {
                    self.escape = Escape::Ground;
                    continue;
                }
                Escape::Ground => {}
            }

            match ch {
                '\r' | '\n' => completed.push(std::mem::take(&mut self.pending)),
                ESCAPE => self.escape = Escape::Start,
                BACKSPACE | DELETE => {
                    self.pending.pop();
                }
                CTRL_C | CTRL_U => self.pending.clear(),
                c if c.is_control() => {}
                c => self.pending.push(c),
            }
        }

        completed
    }

    /// The unterminated tail typed so far.
    pub fn pending(&self) -> &str {
        &self.pending
    }
}

pub struct CommandInterceptor<'a> {
    log: &'a CaptureLog,
    scripts: ScriptCapture<'a>,
    self_filters: Vec<String>,
    script_suffixes: Vec<String>,
    decoder: Utf8Decoder,
    assembler: LineAssembler,
}

impl<'a> CommandInterceptor<'a> {
    pub fn new(log: &'a CaptureLog, settings: &CaptureSettings) -> Self {
        Self {
            log,
            scripts: ScriptCapture::new(log),
            self_filters: settings
                .self_filters
                .iter()
                .filter(|filter| !filter.is_empty())
                .cloned()
                .collect(),
            script_suffixes: settings.script_suffixes.clone(),
            decoder: Utf8Decoder::new(),
            assembler: LineAssembler::new(),
        }
    }

    /// Feeds raw terminal bytes as read from the input descriptor.
    pub fn feed_bytes(&mut self, chunk: &[u8]) {
        let text = self.decoder.decode(chunk);
        self.feed(&text);
    }

    /// Feeds decoded terminal input; each completed line is observed.
    pub fn feed(&mut self, chunk: &str) {
        for line in self.assembler.feed(chunk) {
            self.observe(&line);
        }
    }

    /// Records one command line.
    pub fn observe(&mut self, raw_line: &str) {
        let line = raw_line.trim();
        if line.is_empty() {
            return;
        }

        if self.is_self_invocation(line) {
            debug!(line = %line, "Skipping self invocation");
            return;
        }

        self.log.push_command(line.to_string());

        if self.is_script_invocation(line) {
            self.scripts.capture(Path::new(line));
        }
    }

    fn is_self_invocation(&self, line: &str) -> bool {
        self.self_filters.iter().any(|filter| line.contains(filter))
    }

    fn is_script_invocation(&self, line: &str) -> bool {
        self.script_suffixes
            .iter()
            .any(|suffix| line.ends_with(suffix.as_str()))
            && Path::new(line).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoragePaths;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn settings() -> CaptureSettings {
        CaptureSettings::new(
            &StoragePaths::with_root(PathBuf::from("/nonexistent-home")),
            PathBuf::from("/bin/sh"),
        )
    }

    #[test]
    fn records_trimmed_lines_and_captures_scripts() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("deploy.sh");
        std::fs::write(&script, "#!/bin/sh\necho deploying\n").unwrap();
        let script_line = script.display().to_string();

        let log = CaptureLog::new();
        let settings = settings();
        let mut interceptor = CommandInterceptor::new(&log, &settings);
        for line in ["ls -la", "", "  ", script_line.as_str()] {
            interceptor.observe(line);
        }

        assert_eq!(log.commands(), vec!["ls -la".to_string(), script_line]);
        assert_eq!(
            log.script(&script),
            Some(vec!["#!/bin/sh\n".to_string(), "echo deploying\n".to_string()])
        );
    }

    #[test]
    fn never_records_blank_lines() {
        let log = CaptureLog::new();
        let settings = settings();
        let mut interceptor = CommandInterceptor::new(&log, &settings);
        for line in ["\t", " pwd ", "\r", "   \n", "whoami"] {
            interceptor.observe(line);
        }

        assert_eq!(log.commands(), vec!["pwd", "whoami"]);
    }

    #[test]
    fn drops_self_invocations() {
        let log = CaptureLog::new();
        let settings = settings();
        let mut interceptor = CommandInterceptor::new(&log, &settings);
        interceptor.observe("orcai stop");
        interceptor.observe("cat ~/.orcai_config.json");
        interceptor.observe("echo done");

        assert_eq!(log.commands(), vec!["echo done"]);
    }

    #[test]
    fn missing_script_is_recorded_but_not_captured() {
        let log = CaptureLog::new();
        let settings = settings();
        let mut interceptor = CommandInterceptor::new(&log, &settings);
        interceptor.observe("/definitely/not/here.sh");

        assert_eq!(log.commands(), vec!["/definitely/not/here.sh"]);
        assert_eq!(log.script_count(), 0);
    }

    #[test]
    fn assembler_joins_keystrokes_across_chunks() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.feed("l").is_empty());
        assert!(assembler.feed("s -l").is_empty());
        assert_eq!(assembler.pending(), "ls -l");
        assert_eq!(assembler.feed("a\r"), vec!["ls -la"]);
        assert_eq!(assembler.pending(), "");
    }

    #[test]
    fn assembler_applies_line_editing() {
        let mut assembler = LineAssembler::new();
        assert_eq!(assembler.feed("lsx\x7f -la\r"), vec!["ls -la"]);
        assert_eq!(assembler.feed("rm -rf /\x15echo ok\r"), vec!["echo ok"]);
        assert_eq!(assembler.feed("sleep 100\x03uptime\n"), vec!["uptime"]);
    }

    #[test]
    fn assembler_drops_escape_sequences() {
        let mut assembler = LineAssembler::new();
        // Up arrow, left arrow, SS3 home, bracketed paste markers.
        let lines = assembler.feed("\x1b[Aecho\x1b[D \x1bOHhi\x1b[200~!\x1b[201~\r");
        assert_eq!(lines, vec!["echo hi!"]);
    }

    #[test]
    fn feed_observes_each_completed_line_in_order() {
        let log = CaptureLog::new();
        let settings = settings();
        let mut interceptor = CommandInterceptor::new(&log, &settings);
        interceptor.feed("cd /tmp\rmake");
        interceptor.feed(" install\r\n\r");

        assert_eq!(log.commands(), vec!["cd /tmp", "make install"]);
    }

    #[test]
    fn character_split_across_reads_is_kept_whole() {
        let log = CaptureLog::new();
        let settings = settings();
        let mut interceptor = CommandInterceptor::new(&log, &settings);
        interceptor.feed_bytes(b"echo \xC3");
        interceptor.feed_bytes(b"\xA9\r");

        assert_eq!(log.commands(), vec!["echo é"]);
    }

    #[test]
    fn decoder_replaces_only_undecodable_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{fffd}b");
        // First two bytes of a three-byte character are held back.
        assert_eq!(decoder.decode(b"x\xE2\x82"), "x");
        assert_eq!(decoder.decode(b"\xAC!"), "\u{20ac}!");
        // A truncated sequence followed by a non-continuation byte is invalid.
        assert_eq!(decoder.decode(b"\xC3"), "");
        assert_eq!(decoder.decode(b"z"), "\u{fffd}z");
    }

    #[test]
    fn assembler_swallows_alt_chords() {
        let mut assembler = LineAssembler::new();
        assert_eq!(assembler.feed("git\x1bb status\r"), vec!["git status"]);
    }
}
