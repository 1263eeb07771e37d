use std::io::Write;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use crate::{AppContext, split_command, upload_command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Split,
    /// Upload at most the given number of segments, or the configured run
    /// quota.
    Upload(Option<usize>),
    Exit,
}

/// Parse a menu answer. `2` uploads with the configured quota, `2 5`
/// uploads at most 5 segments.
pub fn parse_choice(line: &str) -> Option<Choice> {
    let mut words = line.split_whitespace();
    let choice = match words.next()? {
        "1" => Choice::Split,
        "2" => match words.next() {
            Some(limit) => Choice::Upload(Some(limit.parse().ok()?)),
            None => Choice::Upload(None),
        },
        "3" | "q" => Choice::Exit,
        _ => return None,
    };

    words.next().is_none().then_some(choice)
}

fn prompt(run_quota: usize) {
    println!();
    println!("1) Split videos into parts");
    println!("2) Upload parts (up to {run_quota}, or `2 N` for N)");
    println!("3) Exit");
    print!("Choose an option: ");
    std::io::stdout().flush().ok();
}

/// Read answers until one is valid. `None` at end of input.
async fn next_choice<R>(
    lines: &mut Lines<R>,
    run_quota: usize,
) -> std::io::Result<Option<Choice>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        prompt(run_quota);

        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };

        match parse_choice(&line) {
            Some(choice) => return Ok(Some(choice)),
            None => println!("Invalid option: {}", line.trim()),
        }
    }
}

/// Interactive loop. Failures of a single action are printed and the menu
/// is shown again. Returns `false` only when the input cannot be read.
pub async fn run<R>(context: &AppContext, input: R) -> bool
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();

    loop {
        let choice = match next_choice(&mut lines, context.config.run_quota)
            .await
        {
            Ok(Some(choice)) => choice,
            Ok(None) => return true,
            Err(e) => {
                tracing::error!("failed to read input: {}", e);
                return false;
            }
        };

        let result = match choice {
            Choice::Split => split_command(context).await,
            Choice::Upload(limit) => upload_command(context, limit).await,
            Choice::Exit => return true,
        };

        if let Err(e) = result {
            tracing::error!("{}", e);
            println!("Error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("1"), Some(Choice::Split));
        assert_eq!(parse_choice(" 2 \n"), Some(Choice::Upload(None)));
        assert_eq!(parse_choice("2 5"), Some(Choice::Upload(Some(5))));
        assert_eq!(parse_choice("3"), Some(Choice::Exit));
        assert_eq!(parse_choice("q"), Some(Choice::Exit));
    }

    #[test]
    fn test_parse_invalid_choice() {
        assert_eq!(parse_choice(""), None);
        assert_eq!(parse_choice("4"), None);
        assert_eq!(parse_choice("2 many"), None);
        assert_eq!(parse_choice("2 -1"), None);
        assert_eq!(parse_choice("1 2"), None);
    }

    #[tokio::test]
    async fn test_invalid_answers_are_asked_again() {
        let input: &[u8] = b"hello\n\n2 4\n";
        let mut lines = BufReader::new(input).lines();

        assert_eq!(
            next_choice(&mut lines, 10).await.unwrap(),
            Some(Choice::Upload(Some(4)))
        );
        assert_eq!(next_choice(&mut lines, 10).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_exit_and_end_of_input() {
        let context = AppContext {
            config: crate::Config::default(),
        };

        assert!(run(&context, &b"3\n"[..]).await);
        assert!(run(&context, &b""[..]).await);
    }
}
