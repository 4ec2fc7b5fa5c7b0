// Sage CLI - Event rendering

use std::io::Write;

use sage_protocol::EventMsg;
use tokio::sync::mpsc;

const TOOL_OUTPUT_PREVIEW: usize = 800;

/// Prints turn events until the sender side is dropped. Answer text goes
/// to stdout; thoughts, tool activity and errors go to stderr.
pub async fn render_events(mut rx: mpsc::Receiver<EventMsg>) {
    let mut in_thought = false;
    while let Some(event) = rx.recv().await {
        match event {
            EventMsg::PlanGenerated(plan) => eprintln!("Plan:\n{}\n", plan.plan),
            EventMsg::ThoughtDelta(delta) => {
                if !in_thought {
                    eprint!("Thinking: ");
                    in_thought = true;
                }
                eprint!("{}", delta.delta);
            }
            EventMsg::AnswerDelta(delta) => {
                if in_thought {
                    eprintln!();
                    in_thought = false;
                }
                print!("{}", delta.delta);
                let _ = std::io::stdout().flush();
            }
            EventMsg::ToolCallBegin(call) => {
                in_thought = false;
                eprintln!("\n> {} {}", call.name, call.arguments);
            }
            EventMsg::ToolCallEnd(end) => {
                let status = if end.is_error { "failed" } else { "done" };
                eprintln!("< {} {status}\n{}", end.name, preview(&end.output));
                for artifact in &end.artifacts {
                    eprintln!("  saved {artifact}");
                }
            }
            EventMsg::Finalizing(finalizing) => eprintln!(
                "\nStep limit ({}) reached, asking for a final answer...",
                finalizing.max_steps
            ),
            EventMsg::Error(error) => eprintln!("\nError: {}", error.message),
            EventMsg::TurnCompleted(_) => println!(),
            EventMsg::TurnStarted(_) | EventMsg::StepStarted(_) => {}
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= TOOL_OUTPUT_PREVIEW {
        return text.to_string();
    }
    let cut: String = text.chars().take(TOOL_OUTPUT_PREVIEW).collect();
    format!("{cut}...")
}
