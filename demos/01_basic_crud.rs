//! Demo 01: Basic CRUD Operations
//!
//! Insert, read, update and delete a task through the store.
//!
//! Run with: cargo run --example 01_basic_crud

use eyre::{Result, eyre};
use mockable::DefaultClock;
use todostore::{Priority, TaskDraft, TaskStore};

fn main() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let store_path = temp_dir.path().to_path_buf();

    println!("TodoStore Basic CRUD Demo");
    println!("=========================\n");
    println!("Store path: {}\n", store_path.display());

    let store = TaskStore::open(&store_path, DefaultClock)?;

    // CREATE
    println!("1. INSERT - Adding a task...");
    let id = store.insert(TaskDraft::new("Buy milk", Priority::Medium)).wait()?;
    println!("   Assigned id: {}\n", id);

    // READ
    println!("2. GET BY ID - Reading it back...");
    let task = store
        .get_by_id(id)
        .first()
        .ok_or_else(|| eyre!("store closed"))??
        .ok_or_else(|| eyre!("task {} missing", id))?;
    println!("   {} (priority {}, updated_at {})\n", task.description, task.priority, task.updated_at);

    // UPDATE
    println!("3. UPDATE - Changing description and priority...");
    let mut edited = task.clone();
    edited.description = "Buy milk and eggs".to_string();
    edited.priority = Priority::High;
    let changed = store.update(edited).wait()?;
    println!("   Row changed: {}\n", changed);

    // DELETE
    println!("4. DELETE - Removing it (twice)...");
    println!("   First delete removed a row: {}", store.delete(id).wait()?);
    println!("   Second delete removed a row: {}\n", store.delete(id).wait()?);

    let remaining = store.get_all().first().ok_or_else(|| eyre!("store closed"))??;
    println!("Remaining tasks: {}", remaining.len());

    Ok(())
}
