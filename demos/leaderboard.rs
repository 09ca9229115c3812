use pullboard::{
    render_html, render_rows, ActivityQuery, LeaderboardOptions, OutputFormat, PullboardBuilder,
    TimeWindow,
};
use std::env;

/// Usage: leaderboard <org/project or org>... [--since now-30d] [--users a,b] [--out board.html]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut repos = Vec::new();
    let mut since = "now-30d".to_string();
    let mut users = Vec::new();
    let mut out = "leaderboard.html".to_string();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--since" => since = args.next().unwrap_or(since),
            "--users" => {
                users = args
                    .next()
                    .unwrap_or_default()
                    .split(',')
                    .map(str::to_string)
                    .collect()
            }
            "--out" => out = args.next().unwrap_or(out),
            _ => repos.push(arg),
        }
    }
    if repos.is_empty() {
        repos.push("kubernetes/minikube".to_string());
    }

    let window = TimeWindow::parse(&since, "now", chrono::Utc::now())?;
    let ingestor = PullboardBuilder::new().rate_limit(600).build()?;
    println!("{}", ingestor.api().rate_limit_status().await?);

    let resolved = ingestor.resolve_repositories(&repos).await?;
    let query = ActivityQuery::new(window).with_actors(&users);
    let bundle = ingestor.collect(&resolved, &query).await?;

    println!("=== Merged PRs ===");
    println!("{}", render_rows(&bundle.prs, OutputFormat::Csv)?);

    let options = LeaderboardOptions {
        title: format!("{} leaderboard", repos.join(", ")),
        window,
        disable_caching: false,
        command: Some(env::args().collect::<Vec<_>>().join(" ")),
        top_n: ingestor.config().leaderboard.top_n,
    };
    std::fs::write(&out, render_html(&options, &bundle)?)?;
    println!("Wrote {}", out);

    Ok(())
}
