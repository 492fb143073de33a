//! Single-question command.

use vidstats::StatsService;

/// Answer `question` and print the answer.
pub async fn cmd_ask(service: &StatsService, question: &str) -> anyhow::Result<()> {
    let answer = service.process_query(question).await;
    println!("{}", answer);
    service.close();
    Ok(())
}
