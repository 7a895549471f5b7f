//! `orcai config`: interactive setup of the summarization endpoint.

use orcai_core::{load_config, save_config, OrcaiConfig, StoragePaths};
use std::io::{self, BufRead, Write};

const DEFAULT_ENDPOINT_HINT: &str = "https://api.openai.com/v1/chat/completions";

pub fn run(paths: &StoragePaths) -> orcai_core::Result<()> {
    let current = load_config(paths.config_file())?;

    println!("Configuring orcai...");
    let stdin = io::stdin();
    let stdout = io::stdout();
    let config = prompt_config(&mut stdin.lock(), &mut stdout.lock(), &current)
        .map_err(|err| orcai_core::OrcaiError::io("Failed to read answers", err))?;

    save_config(paths.config_file(), &config)?;
    tracing::info!(path = %paths.config_file().display(), "Configuration saved");
    println!("Configuration saved to {}", paths.config_file().display());
    Ok(())
}

/// Asks for every field in turn. An empty answer keeps the current value.
pub fn prompt_config<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    current: &OrcaiConfig,
) -> io::Result<OrcaiConfig> {
    let api_endpoint = ask(
        input,
        output,
        &format!("API endpoint (e.g., {})", DEFAULT_ENDPOINT_HINT),
        current.api_endpoint.as_deref(),
    )?;
    let api_key = ask_secret(input, output, current.api_key.as_deref())?;
    let model = ask(input, output, "Model", Some(current.model()))?;
    let context_length = ask_number(input, output, current.context_length())?;

    Ok(OrcaiConfig {
        api_endpoint: api_endpoint.or_else(|| current.api_endpoint.clone()),
        api_key: api_key.or_else(|| current.api_key.clone()),
        model: model.or_else(|| current.model.clone()),
        context_length: context_length.or(current.context_length),
    })
}

fn read_answer<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let answer = line.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}

fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
    current: Option<&str>,
) -> io::Result<Option<String>> {
    match current {
        Some(value) => write!(output, "{} [{}]: ", label, value)?,
        None => write!(output, "{}: ", label)?,
    }
    output.flush()?;
    read_answer(input)
}

fn ask_secret<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    current: Option<&str>,
) -> io::Result<Option<String>> {
    let hint = current.map(|_| "keep current");
    ask(input, output, "API key", hint)
}

fn ask_number<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    current: u32,
) -> io::Result<Option<u32>> {
    loop {
        let current_text = current.to_string();
        let Some(answer) = ask(input, output, "Maximum context length", Some(&current_text))?
        else {
            return Ok(None);
        };
        match answer.parse::<u32>() {
            Ok(value) if value > 0 => return Ok(Some(value)),
            _ => writeln!(output, "Please enter a positive whole number.")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn answers_fill_every_field() {
        let mut input = Cursor::new("https://llm.local/v1/chat/completions\nsk-abc\ngpt-4o\n4096\n");
        let mut output = Vec::new();

        let config = prompt_config(&mut input, &mut output, &OrcaiConfig::default()).unwrap();

        assert_eq!(
            config,
            OrcaiConfig {
                api_endpoint: Some("https://llm.local/v1/chat/completions".to_string()),
                api_key: Some("sk-abc".to_string()),
                model: Some("gpt-4o".to_string()),
                context_length: Some(4096),
            }
        );
        let prompts = String::from_utf8(output).unwrap();
        assert!(prompts.contains("Model [gpt-4]: "));
    }

    #[test]
    fn empty_answers_keep_current_values() {
        let current = OrcaiConfig {
            api_endpoint: Some("https://stored".to_string()),
            api_key: Some("sk-stored".to_string()),
            model: None,
            context_length: Some(1024),
        };
        let mut input = Cursor::new("\n\n\n\n");
        let mut output = Vec::new();

        let config = prompt_config(&mut input, &mut output, &current).unwrap();

        assert_eq!(config, current);
        let prompts = String::from_utf8(output).unwrap();
        assert!(!prompts.contains("sk-stored"));
    }

    #[test]
    fn invalid_context_length_is_asked_again() {
        let mut input = Cursor::new("\n\n\nlots\n0\n512\n");
        let mut output = Vec::new();

        let config = prompt_config(&mut input, &mut output, &OrcaiConfig::default()).unwrap();

        assert_eq!(config.context_length, Some(512));
        let prompts = String::from_utf8(output).unwrap();
        assert_eq!(prompts.matches("Please enter a positive whole number.").count(), 2);
    }

    #[test]
    fn end_of_input_keeps_what_is_left() {
        let mut input = Cursor::new("https://only-endpoint\n");
        let mut output = Vec::new();

        let config = prompt_config(&mut input, &mut output, &OrcaiConfig::default()).unwrap();

        assert_eq!(config.api_endpoint.as_deref(), Some("https://only-endpoint"));
        assert_eq!(config.api_key, None);
        assert_eq!(config.context_length, None);
    }
}
