use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

/// Questions asked on stdout, answered line by line.
///
/// The same line reader later feeds the command listener, so nothing typed
/// ahead is lost between the two.
pub struct Prompter<R> {
    lines: Lines<R>,
}

impl<R> Prompter<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Print `question` and return the trimmed answer, or `None` at end of
    /// input.
    pub async fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        print!("{question}");
        io::Write::flush(&mut io::stdout())?;
        Ok(self
            .lines
            .next_line()
            .await?
            .map(|line| line.trim().to_string()))
    }

    /// Like [`Prompter::ask`] but an empty answer picks `default`.
    pub async fn ask_or(&mut self, question: &str, default: &str) -> io::Result<String> {
        let answer = self.ask(&format!("{question} [{default}]: ")).await?;
        Ok(match answer {
            Some(a) if !a.is_empty() => a,
            _ => default.to_string(),
        })
    }

    /// Yes/no question. Anything but `y`/`yes` counts as no.
    pub async fn confirm(&mut self, question: &str) -> io::Result<bool> {
        let answer = self.ask(&format!("{question} (y/n): ")).await?;
        Ok(matches!(
            answer.as_deref().map(str::to_lowercase).as_deref(),
            Some("y" | "yes")
        ))
    }

    /// Ask for a file path until an existing file is given. `None` when the
    /// operator quits or input ends.
    pub async fn source_path(&mut self) -> io::Result<Option<PathBuf>> {
        loop {
            let Some(answer) = self
                .ask("Path to the text file to convert (q to quit): ")
                .await?
            else {
                return Ok(None);
            };
            let answer = answer.trim_matches(|c| c == '"' || c == '\'');
            if answer.is_empty() {
                continue;
            }
            if matches!(answer.to_lowercase().as_str(), "q" | "quit" | "exit") {
                return Ok(None);
            }
            let path = expand_home(answer);
            if path.is_file() {
                return Ok(Some(path));
            }
            if path.is_dir() {
                println!("{} is a directory, not a file.", path.display());
            } else {
                println!("File {} not found.", path.display());
            }
        }
    }

    /// Hand over the remaining input.
    pub fn into_lines(self) -> Lines<R> {
        self.lines
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}
