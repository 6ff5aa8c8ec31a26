//! Demo 02: Live List
//!
//! A viewer thread holds a `get_all` subscription and prints every emission
//! while the main thread issues writes. A viewer that falls behind skips to
//! the newest snapshot instead of replaying every intermediate one.
//!
//! Run with: cargo run --example 02_live_list

use eyre::{Result, eyre};
use mockable::DefaultClock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use todostore::{Priority, TaskDraft, TaskRecord, TaskStore, display};

fn main() -> Result<()> {
    let store = TaskStore::open_in_memory(DefaultClock)?;

    println!("TodoStore Live List Demo");
    println!("========================\n");

    let mut tasks = store.get_all();
    let done = AtomicBool::new(false);

    thread::scope(|s| -> Result<()> {
        let viewer = s.spawn(|| {
            let mut n = 0;
            loop {
                match tasks.recv_timeout(Duration::from_millis(100)) {
                    Some(Ok(rows)) => {
                        println!("-- emission {} ({} tasks)", n, rows.len());
                        println!("{}\n", display::format_list(&rows, display::DEFAULT_DATE_FORMAT));
                        n += 1;
                    }
                    Some(Err(err)) => {
                        println!("storage failure: {}", err);
                        break;
                    }
                    None if done.load(Ordering::Acquire) || !tasks.is_active() => break,
                    None => {}
                }
            }
            tasks.detach();
        });

        let writes = run_writes(&store);
        done.store(true, Ordering::Release);

        viewer.join().map_err(|_| eyre!("viewer panicked"))?;
        writes
    })?;

    println!("Done.");
    Ok(())
}

fn run_writes(store: &TaskStore) -> Result<()> {
    let a = store.insert(TaskDraft::new("Write report", Priority::Low)).wait()?;
    store.insert(TaskDraft::new("Call plumber", Priority::High)).wait()?;
    store
        .update(TaskRecord {
            id: a,
            description: "Write report (draft sent)".to_string(),
            priority: Priority::Medium,
            updated_at: 0,
        })
        .wait()?;
    store.delete(a).wait()?;
    Ok(())
}
