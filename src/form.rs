// Task form: create/edit submission rules

use crate::error::{StoreError, StoreResult};
use crate::record::{Priority, TaskDraft, TaskId, TaskRecord};
use crate::store::{Completion, TaskStore};
use tracing::debug;

/// Whether the form creates a row or edits an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(TaskId),
}

/// Editable task form
///
/// The carried target id alone decides between insert and update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskForm {
    target: Option<TaskId>,
    description: String,
    selected: Option<Priority>,
}

impl TaskForm {
    /// Empty form in create mode
    pub fn create() -> Self {
        Self::default()
    }

    /// Form in edit mode, pre-populated from a one-shot read of `id`
    ///
    /// Later changes to the row are not reflected. If the row does not exist
    /// the form stays in edit mode with empty fields, and submitting it is a
    /// no-op update.
    pub fn edit(store: &TaskStore, id: TaskId) -> StoreResult<Self> {
        let mut form = Self {
            target: Some(id),
            ..Self::default()
        };

        match store.get_by_id(id).first() {
            Some(Ok(Some(record))) => form.populate(&record),
            Some(Ok(None)) => debug!(id, "edit: task not found, form left empty"),
            Some(Err(err)) => return Err(err),
            None => return Err(StoreError::Closed),
        }

        Ok(form)
    }

    fn populate(&mut self, record: &TaskRecord) {
        self.description = record.description.clone();
        self.selected = Some(record.priority);
    }

    pub fn mode(&self) -> FormMode {
        match self.target {
            Some(id) => FormMode::Edit(id),
            None => FormMode::Create,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn select_priority(&mut self, priority: Priority) {
        self.selected = Some(priority);
    }

    /// Select from raw input (`1`..`3` or a name). Rejected values leave the
    /// current selection untouched.
    pub fn select_priority_input(&mut self, input: &str) -> StoreResult<Priority> {
        let priority: Priority = input.parse()?;
        self.selected = Some(priority);
        Ok(priority)
    }

    /// Selected priority, HIGH when nothing was chosen
    pub fn priority(&self) -> Priority {
        self.selected.unwrap_or_default()
    }

    /// Queue the write this form stands for
    pub fn submit(self, store: &TaskStore) -> Submission {
        let priority = self.priority();
        match self.target {
            None => {
                debug!(?priority, "form: insert");
                Submission::Insert(store.insert(TaskDraft::new(self.description, priority)))
            }
            Some(id) => {
                debug!(id, ?priority, "form: update");
                let record = TaskRecord {
                    id,
                    description: self.description,
                    priority,
                    // Stamped by the store
                    updated_at: 0,
                };
                Submission::Update(id, store.update(record))
            }
        }
    }
}

/// Pending form write
#[derive(Debug)]
pub enum Submission {
    Insert(Completion<TaskId>),
    Update(TaskId, Completion<bool>),
}

/// Committed form write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saved {
    Created(TaskId),
    Updated(TaskId),
    /// Edit target no longer exists; nothing was written
    Missing(TaskId),
}

impl Submission {
    pub fn wait(self) -> StoreResult<Saved> {
        match self {
            Submission::Insert(completion) => completion.wait().map(Saved::Created),
            Submission::Update(id, completion) => completion
                .wait()
                .map(|changed| if changed { Saved::Updated(id) } else { Saved::Missing(id) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> TaskStore {
        TaskStore::open_in_memory(ManualClock::new(100)).unwrap()
    }

    #[test]
    fn test_new_form_defaults_to_high_priority() {
        let form = TaskForm::create();
        assert_eq!(form.mode(), FormMode::Create);
        assert_eq!(form.priority(), Priority::High);
        assert_eq!(form.description(), "");
    }

    #[test]
    fn test_invalid_priority_rejected_at_form() {
        let mut form = TaskForm::create();
        form.select_priority(Priority::Low);

        assert!(matches!(form.select_priority_input("4"), Err(StoreError::InvalidPriority(_))));
        assert!(form.select_priority_input("soon").is_err());
        assert_eq!(form.priority(), Priority::Low);

        assert_eq!(form.select_priority_input("medium").unwrap(), Priority::Medium);
        assert_eq!(form.priority(), Priority::Medium);
    }

    #[test]
    fn test_create_submission_inserts() {
        let store = store();
        let mut form = TaskForm::create();
        form.set_description("Buy milk");
        form.select_priority(Priority::Medium);

        let Saved::Created(id) = form.submit(&store).wait().unwrap() else {
            panic!("expected insert");
        };
        let record = store.get_by_id(id).first().unwrap().unwrap().unwrap();
        assert_eq!(record.description, "Buy milk");
        assert_eq!(record.priority, Priority::Medium);
    }

    #[test]
    fn test_edit_prepopulates_and_updates() {
        let store = store();
        let id = store.insert(TaskDraft::new("Buy milk", Priority::Low)).wait().unwrap();

        let mut form = TaskForm::edit(&store, id).unwrap();
        assert_eq!(form.mode(), FormMode::Edit(id));
        assert_eq!(form.description(), "Buy milk");
        assert_eq!(form.priority(), Priority::Low);

        form.set_description("Buy milk and eggs");
        assert_eq!(form.submit(&store).wait().unwrap(), Saved::Updated(id));

        let rows = store.get_all().first().unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].description, "Buy milk and eggs");
        assert_eq!(rows[0].priority, Priority::Low);
    }

    #[test]
    fn test_edit_is_one_shot_read() {
        let store = store();
        let id = store.insert(TaskDraft::new("v1", Priority::Low)).wait().unwrap();

        let form = TaskForm::edit(&store, id).unwrap();
        let mut changed = store.get_by_id(id).first().unwrap().unwrap().unwrap();
        changed.description = "v2".to_string();
        store.update(changed).wait().unwrap();

        assert_eq!(form.description(), "v1");
    }

    #[test]
    fn test_edit_of_missing_task_stays_in_edit_mode() {
        let store = store();
        let mut form = TaskForm::edit(&store, 999).unwrap();
        assert_eq!(form.mode(), FormMode::Edit(999));
        assert_eq!(form.description(), "");
        assert_eq!(form.priority(), Priority::High);

        form.set_description("never stored");
        assert_eq!(form.submit(&store).wait().unwrap(), Saved::Missing(999));
        assert!(store.get_all().first().unwrap().unwrap().is_empty());
    }
}
