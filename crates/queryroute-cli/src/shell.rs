use anyhow::Result;
use queryroute_core::Session;
use queryroute_local::router::Router;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::error;

const PROMPT: &str = "Ask me anything: ";
const FAILURE_NOTICE: &str = "Sorry, something went wrong while answering that. Please try again.";

/// Print the whole conversation, oldest turn first.
pub fn render_history(session: &Session, out: &mut impl Write) -> std::io::Result<()> {
    for turn in session.turns() {
        writeln!(out, "You: {}", turn.query)?;
        writeln!(out, "Bot: {}", turn.response)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Read queries line by line until EOF or `/quit`, answering each in turn.
///
/// Blank lines are ignored. A query whose classifier or answer call fails prints a short
/// notice and is not added to the history.
pub async fn run<R, W>(router: &Router, input: R, mut out: W) -> Result<Session>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut session = Session::new();
    let mut lines = input.lines();
    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "/quit" | "/exit") {
            break;
        }

        match router.respond(&mut session, query).await {
            Ok(_) => {
                writeln!(out)?;
                render_history(&session, &mut out)?;
            }
            Err(e) => {
                error!(error = %e, "query failed");
                writeln!(out, "Bot: {FAILURE_NOTICE}")?;
            }
        }
    }
    Ok(session)
}
