//! Follow a database's changes feed and print every change.
//!
//! Run with: cargo run --example follow_changes -- http://localhost:5984/mydb [since]

use anyhow::Context;
use couchdb_http::protocol::{options, OptionValue};
use couchdb_http::{Change, ChangeCallback, Database};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "http://localhost:5984/feeds".to_string());
    let since = args.next();

    let db = Database::connect(&url)
        .await
        .with_context(|| format!("cannot reach {}", url))?;
    let info = db.get_info().await?;
    println!("Following {} ({} documents, update_seq {})", info.name, info.doc_count, info.update_seq);

    let mut opts = options([
        ("feed", OptionValue::from("continuous")),
        ("heartbeat", 5000.into()),
        ("include_docs", false.into()),
    ]);
    if let Some(since) = since {
        opts.insert("since".to_string(), since.into());
    }

    let mut follow = ChangeCallback::new(|change: &Change| {
        let revs: Vec<&str> = change
            .changed_revs
            .iter()
            .map(|r| r.revision.as_str())
            .collect();
        let state = if change.deleted { "deleted" } else { "updated" };
        println!("{:>12}  {} {} [{}]", change.sequence, change.id, state, revs.join(", "));
        true
    });

    db.changes(&mut follow, &opts).await?;
    Ok(())
}
