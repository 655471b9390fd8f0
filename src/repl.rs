//! Interactive terminal chat with the assistant.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::agent::{ChatModel, Conversation};

fn is_exit_command(line: &str) -> bool {
    matches!(line.to_ascii_lowercase().as_str(), "quit" | "exit" | "q")
}

/// Run a chat session until the user quits or input ends.
///
/// Model failures are reported and the session continues.
pub async fn run<R, W>(
    brand: &str,
    mut conversation: Conversation,
    model: &dyn ChatModel,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let rule = "=".repeat(60);
    output
        .write_all(
            format!(
                "\n{rule}\n{brand} Customer Service Agent\n{rule}\n\
                 Hello! I am your {brand} assistant. How can I help you?\n\
                 Type 'quit' or 'exit' to quit.\n\n"
            )
            .as_bytes(),
        )
        .await?;

    let mut lines = input.lines();
    loop {
        output.write_all(b"You: ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();

        if is_exit_command(question) {
            let farewell = format!("\nThank you for contacting {brand}. See you soon!\n");
            output.write_all(farewell.as_bytes()).await?;
            break;
        }
        if question.is_empty() {
            continue;
        }

        match conversation.ask(model, question).await {
            Ok(answer) => {
                output.write_all(format!("\nAgent: {answer}\n\n").as_bytes()).await?;
            }
            Err(e) => {
                debug!(error = %e, "Chat turn failed");
                output.write_all(format!("\nError: {e}\n\n").as_bytes()).await?;
            }
        }
    }

    output.flush().await
}
