use pullboard::{ActivityQuery, OutputFormat, PullboardBuilder, TimeWindow};
use std::env;

/// Usage: org_activity <org> [json|csv]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let org = env::args().nth(1).unwrap_or_else(|| "kubernetes-sigs".to_string());
    let format: OutputFormat = env::args().nth(2).unwrap_or_else(|| "csv".to_string()).parse()?;

    let ingestor = PullboardBuilder::new().max_retries(2).build()?;
    let window = TimeWindow::parse("now-7d", "now", chrono::Utc::now())?;
    let query = ActivityQuery::new(window);

    let repos = ingestor.resolve_repositories(&[org.as_str()]).await?;
    println!("Found {} repositories in {}", repos.len(), org);

    let issues = ingestor.issue_summaries(&repos, &query).await?;
    let comments = ingestor.comment_summaries(&repos, &query).await?;

    println!("=== Closed issues ({}) ===", issues.len());
    println!("{}", pullboard::render_rows(&issues, format)?);

    println!("=== Commenters ({}) ===", comments.len());
    println!("{}", pullboard::render_rows(&comments, format)?);

    for entry in pullboard::leaderboard::issue_closers(&issues, 5) {
        println!("  {:<24} {}", entry.name, entry.count);
    }

    println!("\n{}", ingestor.api().rate_limit_status().await?);
    Ok(())
}
