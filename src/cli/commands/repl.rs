//! Line-oriented question loop.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{error, info};

use vidstats::StatsService;

/// Read questions from stdin, one per line, and print each answer as soon
/// as it is ready. Questions are answered concurrently.
pub async fn cmd_repl(service: Arc<StatsService>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    let mut asked = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let question = line.trim().to_string();
                if question.is_empty() {
                    continue;
                }
                asked += 1;
                let service = Arc::clone(&service);
                tasks.spawn(async move {
                    let answer = service.process_query(&question).await;
                    (question, answer)
                });
            }
            Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                print_answer(done);
            }
        }
    }

    while let Some(done) = tasks.join_next().await {
        print_answer(done);
    }

    info!("Answered {} questions", asked);
    service.close();
    Ok(())
}

fn print_answer(done: Result<(String, String), tokio::task::JoinError>) {
    match done {
        Ok((question, answer)) => println!("{}\t{}", question, answer),
        Err(e) => error!("Question task failed: {}", e),
    }
}
