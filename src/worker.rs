// Disk-io lane: the single thread that owns the tasks table
//
// Commands arrive in send order, so writes are serialized and every
// subscriber sees results in commit order.

use crate::error::{StoreError, StoreResult};
use crate::record::{TaskDraft, TaskId, TaskRecord};
use crate::subscription::{Subscriber, SubscriptionId};
use crate::table::Table;
use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, Sender};
use tracing::{debug, error, info};

pub(crate) enum Command {
    Insert(TaskDraft, Sender<StoreResult<TaskId>>),
    Update(TaskRecord, Sender<StoreResult<bool>>),
    Delete(TaskId, Sender<StoreResult<bool>>),
    Subscribe(SubscriptionId, Subscriber),
    Detach(SubscriptionId),
    #[cfg(test)]
    Execute(String, Sender<StoreResult<()>>),
    Shutdown,
}

pub(crate) struct Worker {
    table: Table,
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
    /// Set on the first storage failure; everything after that is refused
    failure: Option<StoreError>,
}

impl Worker {
    pub(crate) fn new(table: Table) -> Self {
        Self {
            table,
            subscribers: BTreeMap::new(),
            failure: None,
        }
    }

    pub(crate) fn run(mut self, commands: Receiver<Command>) {
        info!("Store worker started");

        for command in commands.iter() {
            match command {
                Command::Insert(draft, reply) => {
                    let result = self.guarded(|table| table.insert(&draft));
                    if let Ok(id) = result {
                        debug!(id, priority = ?draft.priority, "insert: committed");
                        self.publish(id);
                    }
                    let _ = reply.send(result);
                }
                Command::Update(record, reply) => {
                    let result = self.guarded(|table| table.update(&record));
                    match result {
                        Ok(true) => {
                            debug!(id = record.id, priority = ?record.priority, "update: committed");
                            self.publish(record.id);
                        }
                        Ok(false) => debug!(id = record.id, "update: no such row, ignored"),
                        Err(_) => {}
                    }
                    let _ = reply.send(result);
                }
                Command::Delete(id, reply) => {
                    let result = self.guarded(|table| table.delete(id));
                    match result {
                        Ok(true) => {
                            debug!(id, "delete: committed");
                            self.publish(id);
                        }
                        Ok(false) => debug!(id, "delete: already absent"),
                        Err(_) => {}
                    }
                    let _ = reply.send(result);
                }
                Command::Subscribe(sub_id, subscriber) => self.attach(sub_id, subscriber),
                Command::Detach(sub_id) => {
                    if self.subscribers.remove(&sub_id).is_some() {
                        debug!(subscription = sub_id, "detached");
                    }
                }
                #[cfg(test)]
                Command::Execute(sql, reply) => {
                    let _ = reply.send(self.table.execute_raw(&sql));
                }
                Command::Shutdown => break,
            }
        }

        info!(subscribers = self.subscribers.len(), "Store worker stopped");
    }

    /// Run a table operation unless the store has already failed. A storage
    /// error poisons the store and terminates every subscription.
    fn guarded<T>(&mut self, op: impl FnOnce(&mut Table) -> StoreResult<T>) -> StoreResult<T> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let result = op(&mut self.table);
        if let Err(err) = &result {
            self.fail(err.clone());
        }
        result
    }

    fn attach(&mut self, sub_id: SubscriptionId, subscriber: Subscriber) {
        if let Some(err) = &self.failure {
            subscriber.terminate(err.clone());
            return;
        }

        debug!(subscription = sub_id, query = ?subscriber.query(), "attached");
        let initial = match &subscriber {
            Subscriber::All(tx) => self.table.list().map(|rows| tx.emit(Ok(rows))),
            Subscriber::ById(id, tx) => self.table.get(*id).map(|row| tx.emit(Ok(row))),
        };

        match initial {
            Ok(true) => {
                self.subscribers.insert(sub_id, subscriber);
            }
            Ok(false) => debug!(subscription = sub_id, "receiver gone before first emission"),
            Err(err) => {
                self.subscribers.insert(sub_id, subscriber);
                self.fail(err);
            }
        }
    }

    /// Recompute and push every query a committed write to `changed` can affect
    fn publish(&mut self, changed: TaskId) {
        let mut all_rows: Option<Vec<TaskRecord>> = None;
        let mut gone = Vec::new();
        let mut failure = None;

        for (sub_id, subscriber) in &self.subscribers {
            if !subscriber.query().is_affected_by(changed) {
                continue;
            }

            let sent = match subscriber {
                Subscriber::All(tx) => {
                    if all_rows.is_none() {
                        match self.table.list() {
                            Ok(rows) => all_rows = Some(rows),
                            Err(err) => {
                                failure = Some(err);
                                break;
                            }
                        }
                    }
                    tx.emit(Ok(all_rows.clone().unwrap_or_default()))
                }
                Subscriber::ById(id, tx) => match self.table.get(*id) {
                    Ok(row) => tx.emit(Ok(row)),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                },
            };

            if !sent {
                gone.push(*sub_id);
            }
        }

        if let Some(err) = failure {
            self.fail(err);
            return;
        }

        // Receivers dropped before their detach arrived
        for sub_id in gone {
            self.subscribers.remove(&sub_id);
        }

        debug!(changed, subscribers = self.subscribers.len(), "published");
    }

    fn fail(&mut self, err: StoreError) {
        error!(error = %err, subscribers = self.subscribers.len(), "Storage failure, terminating subscriptions");
        self.failure.get_or_insert_with(|| err.clone());
        for (_, subscriber) in std::mem::take(&mut self.subscribers) {
            subscriber.terminate(err.clone());
        }
    }
}
