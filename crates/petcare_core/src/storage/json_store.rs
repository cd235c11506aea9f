use crate::config::Config;
use crate::error::AppError;
use crate::model::{HealthLogEntry, PushTarget, Reminder, Task};
use crate::storage::{
    HealthLogStore, PushTargetStore, ReminderStore, SortOrder, TaskPatch, TaskStore,
    UpdateOutcome,
};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use time::OffsetDateTime;

pub const SCHEMA_VERSION: u32 = 1;
const STORE_FILE_NAME: &str = "petcare.json";
const STORE_ENV_VAR: &str = "PETCARE_STORE_PATH";

#[derive(Debug, Serialize, Deserialize)]
struct StoredState {
    schema_version: u32,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    health_logs: Vec<HealthLogEntry>,
    #[serde(default)]
    reminders: Vec<Reminder>,
    #[serde(default)]
    push_targets: Vec<PushTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    pub tasks: Vec<Task>,
    pub health_logs: Vec<HealthLogEntry>,
    pub reminders: Vec<Reminder>,
    pub push_targets: Vec<PushTarget>,
}

/// Resolves the store file: `PETCARE_STORE_PATH`, then the configured path,
/// then the per-user default location.
pub fn store_path(config: &Config) -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(STORE_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if let Some(path) = config.store_path.as_ref() {
        return Ok(path.clone());
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("petcare").join(STORE_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("petcare")
            .join(STORE_FILE_NAME))
    }
}

pub fn load_state(path: &Path) -> Result<StoreState, AppError> {
    if !path.exists() {
        return Ok(StoreState::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let stored: StoredState =
        serde_json::from_str(&content).map_err(|err| AppError::invalid_data(err.to_string()))?;

    if !(1..=SCHEMA_VERSION).contains(&stored.schema_version) {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    Ok(StoreState {
        tasks: stored.tasks,
        health_logs: stored.health_logs,
        reminders: stored.reminders,
        push_targets: stored.push_targets,
    })
}

/// Writes the whole document to a temp file beside `path`, then renames it
/// into place so readers never see a partial file.
pub fn save_state(path: &Path, state: &StoreState) -> Result<(), AppError> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir)?;

    let stored = StoredState {
        schema_version: SCHEMA_VERSION,
        tasks: state.tasks.clone(),
        health_logs: state.health_logs.clone(),
        reminders: state.reminders.clone(),
        push_targets: state.push_targets.clone(),
    };
    let content = serde_json::to_string_pretty(&stored)?;

    let io_err = |err: std::io::Error| AppError::io(format!("{}: {}", path.display(), err));
    let mut staged = NamedTempFile::new_in(dir).map_err(io_err)?;
    staged.write_all(content.as_bytes()).map_err(io_err)?;
    staged.as_file().sync_all().map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(staged.path(), permissions)?;
    }

    staged.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Sidecar lock file next to the store document.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

#[derive(Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Advisory lock held on the sidecar file until dropped. The OS releases it
/// if the process dies, so a crash never leaves the store locked.
struct StoreLock {
    file: File,
}

impl StoreLock {
    fn acquire(path: &Path, mode: LockMode) -> Result<Self, AppError> {
        std::fs::create_dir_all(parent_dir(path))?;
        let io_err = |err: std::io::Error| AppError::io(format!("{}: {}", path.display(), err));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;
        match mode {
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        }
        .map_err(io_err)?;
        Ok(Self { file })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

enum Change<T> {
    Save(T),
    Keep(T),
}

/// All four stores backed by one JSON document.
///
/// Reads hold a shared lock on the sidecar `.lock` file and every
/// read-modify-write holds it exclusively, across handles and processes.
/// That exclusive section is what makes the guarded task update atomic.
pub struct JsonStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let lock_path = lock_path(&path);
        Self { path, lock_path }
    }

    pub fn open(config: &Config) -> Result<Self, AppError> {
        Ok(Self::new(store_path(config)?))
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> Result<T, AppError> {
        let _lock = StoreLock::acquire(&self.lock_path, LockMode::Shared)?;
        let state = load_state(&self.path)?;
        Ok(f(&state))
    }

    fn modify<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<Change<T>, AppError>,
    ) -> Result<T, AppError> {
        let _lock = StoreLock::acquire(&self.lock_path, LockMode::Exclusive)?;
        let mut state = load_state(&self.path)?;
        match f(&mut state)? {
            Change::Save(value) => {
                save_state(&self.path, &state)?;
                Ok(value)
            }
            Change::Keep(value) => Ok(value),
        }
    }
}

impl TaskStore for JsonStore {
    fn get(&self, id: &str) -> Result<Option<Task>, AppError> {
        self.read(|state| state.tasks.iter().find(|task| task.id == id).cloned())
    }

    fn update(&self, id: &str, patch: &TaskPatch) -> Result<UpdateOutcome, AppError> {
        self.modify(|state| {
            let Some(task) = state.tasks.iter_mut().find(|task| task.id == id) else {
                return Ok(Change::Keep(UpdateOutcome::Missing));
            };
            if patch.require_pending && task.is_done {
                return Ok(Change::Keep(UpdateOutcome::AlreadyDone(task.clone())));
            }
            patch.apply_to(task);
            Ok(Change::Save(UpdateOutcome::Updated(task.clone())))
        })
    }

    fn insert(&self, task: Task) -> Result<(), AppError> {
        self.modify(|state| {
            if state.tasks.iter().any(|existing| existing.id == task.id) {
                return Err(AppError::conflict(format!("task {} already exists", task.id)));
            }
            state.tasks.push(task);
            Ok(Change::Save(()))
        })
    }

    fn query_by_owner_and_due_range(
        &self,
        owner_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Task>, AppError> {
        self.read(|state| {
            let mut tasks: Vec<Task> = state
                .tasks
                .iter()
                .filter(|task| task.owner_id == owner_id)
                .filter(|task| task.due_date >= start && task.due_date < end)
                .cloned()
                .collect();
            tasks.sort_by_key(|task| task.due_date);
            tasks
        })
    }
}

impl HealthLogStore for JsonStore {
    fn insert(&self, entry: HealthLogEntry) -> Result<(), AppError> {
        self.modify(|state| {
            state.health_logs.push(entry);
            Ok(Change::Save(()))
        })
    }

    fn query_by_pet(
        &self,
        pet_id: &str,
        order: SortOrder,
    ) -> Result<Vec<HealthLogEntry>, AppError> {
        self.read(|state| {
            let mut entries: Vec<HealthLogEntry> = state
                .health_logs
                .iter()
                .filter(|entry| entry.pet_id == pet_id)
                .cloned()
                .collect();
            entries.sort_by_key(|entry| entry.date);
            if order == SortOrder::Descending {
                entries.reverse();
            }
            entries
        })
    }
}

impl ReminderStore for JsonStore {
    fn insert(&self, reminder: Reminder) -> Result<(), AppError> {
        self.modify(|state| {
            if state.reminders.iter().any(|existing| existing.id == reminder.id) {
                return Err(AppError::conflict(format!(
                    "reminder {} already exists",
                    reminder.id
                )));
            }
            state.reminders.push(reminder);
            Ok(Change::Save(()))
        })
    }

    fn query_unsent(&self) -> Result<Vec<Reminder>, AppError> {
        self.read(|state| {
            state
                .reminders
                .iter()
                .filter(|reminder| !reminder.sent)
                .cloned()
                .collect()
        })
    }

    fn mark_sent(&self, id: &str) -> Result<(), AppError> {
        self.modify(|state| {
            let reminder = state
                .reminders
                .iter_mut()
                .find(|reminder| reminder.id == id)
                .ok_or_else(|| AppError::not_found(format!("reminder {id} not found")))?;
            if reminder.sent {
                return Ok(Change::Keep(()));
            }
            reminder.sent = true;
            Ok(Change::Save(()))
        })
    }
}

impl PushTargetStore for JsonStore {
    fn register(&self, target: PushTarget) -> Result<(), AppError> {
        self.modify(|state| {
            state
                .push_targets
                .retain(|existing| existing.owner_id != target.owner_id);
            state.push_targets.push(target);
            Ok(Change::Save(()))
        })
    }

    fn target_for(&self, owner_id: &str) -> Result<Option<PushTarget>, AppError> {
        self.read(|state| {
            state
                .push_targets
                .iter()
                .find(|target| target.owner_id == owner_id)
                .cloned()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonStore, SCHEMA_VERSION, StoreState, load_state, lock_path, save_state};
    use crate::model::{HealthLogEntry, PushTarget, Recurrence, Reminder, Task, TaskType};
    use crate::storage::{
        HealthLogStore, PushTargetStore, ReminderStore, SortOrder, TaskPatch, TaskStore,
        UpdateOutcome,
    };
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Barrier;
    use std::thread;
    use std::time::{SystemTime, UNIX_EPOCH};
    use time::OffsetDateTime;
    use time::macros::datetime;

    fn temp_path(file_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("petcare-{nanos}-{file_name}"))
    }

    fn task(id: &str, owner_id: &str, due_date: OffsetDateTime) -> Task {
        Task {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            pet_id: "pet-1".to_string(),
            task_type: TaskType::Walk,
            due_date,
            recurring: Recurrence::NONE,
            is_done: false,
            done_at: None,
            note: None,
        }
    }

    fn reminder(id: &str, sent: bool) -> Reminder {
        Reminder {
            id: id.to_string(),
            task_id: "task-1".to_string(),
            owner_id: "user-1".to_string(),
            reminder_time: datetime!(2024-03-10 08:00:00 UTC),
            message: "walk time".to_string(),
            sent,
            created_at: datetime!(2024-03-09 08:00:00 UTC),
        }
    }

    fn log_entry(id: &str, pet_id: &str, date: OffsetDateTime) -> HealthLogEntry {
        HealthLogEntry {
            id: id.to_string(),
            task_id: None,
            pet_id: pet_id.to_string(),
            owner_id: "user-1".to_string(),
            entry_type: "Walk".to_string(),
            description: "Completed task: Walk".to_string(),
            date,
            note: None,
        }
    }

    #[test]
    fn missing_file_loads_empty_state() {
        let path = temp_path("missing.json");
        let state = load_state(&path).unwrap();
        assert_eq!(state, StoreState::default());
    }

    #[test]
    fn save_and_load_state_round_trip() {
        let path = temp_path("state.json");
        let state = StoreState {
            tasks: vec![task("task-1", "user-1", datetime!(2024-03-10 09:00:00 UTC))],
            health_logs: vec![log_entry("log-1", "pet-1", datetime!(2024-03-10 09:05:00 UTC))],
            reminders: vec![reminder("reminder-1", false)],
            push_targets: Vec::new(),
        };

        save_state(&path, &state).unwrap();
        let loaded = load_state(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded, state);
    }

    #[test]
    fn schema_version_must_match() {
        let path = temp_path("bad-schema.json");
        let bad = format!(
            "{{\n  \"schema_version\": {},\n  \"tasks\": []\n}}",
            SCHEMA_VERSION + 1
        );
        fs::write(&path, bad).unwrap();

        let err = load_state(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[test]
    fn rejects_malformed_due_date() {
        let path = temp_path("bad-date.json");
        let content = "{\n  \"schema_version\": 1,\n  \"tasks\": [\n    {\n      \"id\": \"task-1\",\n      \"ownerId\": \"user-1\",\n      \"petId\": \"pet-1\",\n      \"type\": \"Walk\",\n      \"dueDate\": \"tomorrow\"\n    }\n  ]\n}";
        fs::write(&path, content).unwrap();

        let err = load_state(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[test]
    fn guarded_update_applies_once() {
        let path = temp_path("guarded.json");
        let store = JsonStore::new(&path);
        TaskStore::insert(
            &store,
            task("task-1", "user-1", datetime!(2024-03-10 09:00:00 UTC)),
        )
        .unwrap();

        let patch = TaskPatch::completion(datetime!(2024-03-10 09:30:00 UTC), None);
        let first = store.update("task-1", &patch).unwrap();
        let second = store.update("task-1", &patch).unwrap();
        let missing = store.update("task-9", &patch).unwrap();
        fs::remove_file(&path).ok();

        match first {
            UpdateOutcome::Updated(task) => assert!(task.is_done),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(second, UpdateOutcome::AlreadyDone(_)));
        assert_eq!(missing, UpdateOutcome::Missing);
    }

    #[test]
    fn separate_handles_share_the_completion_guard() {
        for round in 0..25 {
            let path = temp_path(&format!("handles-{round}.json"));
            TaskStore::insert(
                &JsonStore::new(&path),
                task("task-1", "user-1", datetime!(2024-03-10 09:00:00 UTC)),
            )
            .unwrap();
            let patch = TaskPatch::completion(datetime!(2024-03-10 09:30:00 UTC), None);
            let barrier = Barrier::new(2);
            let (path_ref, barrier, patch) = (&path, &barrier, &patch);

            let outcomes: Vec<UpdateOutcome> = thread::scope(|scope| {
                let workers: Vec<_> = (0..2)
                    .map(|_| {
                        scope.spawn(move || {
                            let store = JsonStore::new(path_ref);
                            barrier.wait();
                            store.update("task-1", patch).unwrap()
                        })
                    })
                    .collect();
                workers.into_iter().map(|w| w.join().unwrap()).collect()
            });
            fs::remove_file(&path).ok();
            fs::remove_file(lock_path(&path)).ok();

            let updated = outcomes
                .iter()
                .filter(|outcome| matches!(outcome, UpdateOutcome::Updated(_)))
                .count();
            let already_done = outcomes
                .iter()
                .filter(|outcome| matches!(outcome, UpdateOutcome::AlreadyDone(_)))
                .count();
            assert_eq!((updated, already_done), (1, 1), "round {round}");
        }
    }

    #[test]
    fn separate_handles_do_not_lose_inserts() {
        let path = temp_path("handles-insert.json");

        thread::scope(|scope| {
            for worker in 0..4 {
                let path = &path;
                scope.spawn(move || {
                    let store = JsonStore::new(path);
                    for n in 0..10 {
                        let id = format!("task-{worker}-{n}");
                        TaskStore::insert(
                            &store,
                            task(&id, "user-1", datetime!(2024-03-10 09:00:00 UTC)),
                        )
                        .unwrap();
                    }
                });
            }
        });
        let state = load_state(&path).unwrap();
        fs::remove_file(&path).ok();
        fs::remove_file(lock_path(&path)).ok();

        assert_eq!(state.tasks.len(), 40);
    }

    #[test]
    fn save_overwrites_through_rename() {
        let path = temp_path("rename.json");
        fs::write(&path, "{ torn").unwrap();

        let state = StoreState {
            tasks: vec![task("task-1", "user-1", datetime!(2024-03-10 09:00:00 UTC))],
            ..StoreState::default()
        };
        save_state(&path, &state).unwrap();
        let loaded = load_state(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded, state);
    }

    #[test]
    fn duplicate_task_id_is_a_conflict() {
        let path = temp_path("duplicate.json");
        let store = JsonStore::new(&path);
        let first = task("task-1", "user-1", datetime!(2024-03-10 09:00:00 UTC));
        TaskStore::insert(&store, first.clone()).unwrap();

        let err = TaskStore::insert(&store, first).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn due_range_is_owner_scoped_and_half_open() {
        let path = temp_path("range.json");
        let store = JsonStore::new(&path);
        for candidate in [
            task("late", "user-1", datetime!(2024-03-10 18:00:00 UTC)),
            task("early", "user-1", datetime!(2024-03-10 00:00:00 UTC)),
            task("next-day", "user-1", datetime!(2024-03-11 00:00:00 UTC)),
            task("other-owner", "user-2", datetime!(2024-03-10 12:00:00 UTC)),
        ] {
            TaskStore::insert(&store, candidate).unwrap();
        }

        let found = store
            .query_by_owner_and_due_range(
                "user-1",
                datetime!(2024-03-10 00:00:00 UTC),
                datetime!(2024-03-11 00:00:00 UTC),
            )
            .unwrap();
        fs::remove_file(&path).ok();

        let ids: Vec<&str> = found.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn health_logs_sort_by_date_in_both_directions() {
        let path = temp_path("logs.json");
        let store = JsonStore::new(&path);
        HealthLogStore::insert(
            &store,
            log_entry("b", "pet-1", datetime!(2024-03-12 09:00:00 UTC)),
        )
        .unwrap();
        HealthLogStore::insert(
            &store,
            log_entry("a", "pet-1", datetime!(2024-03-10 09:00:00 UTC)),
        )
        .unwrap();
        HealthLogStore::insert(
            &store,
            log_entry("x", "pet-2", datetime!(2024-03-11 09:00:00 UTC)),
        )
        .unwrap();

        let ascending = store.query_by_pet("pet-1", SortOrder::Ascending).unwrap();
        let descending = store.query_by_pet("pet-1", SortOrder::Descending).unwrap();
        fs::remove_file(&path).ok();

        let asc_ids: Vec<&str> = ascending.iter().map(|entry| entry.id.as_str()).collect();
        let desc_ids: Vec<&str> = descending.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(asc_ids, vec!["a", "b"]);
        assert_eq!(desc_ids, vec!["b", "a"]);
    }

    #[test]
    fn mark_sent_is_one_way_and_keeps_the_record() {
        let path = temp_path("reminders.json");
        let store = JsonStore::new(&path);
        ReminderStore::insert(&store, reminder("reminder-1", false)).unwrap();
        ReminderStore::insert(&store, reminder("reminder-2", false)).unwrap();

        store.mark_sent("reminder-1").unwrap();
        store.mark_sent("reminder-1").unwrap();
        let unsent = store.query_unsent().unwrap();
        let missing = store.mark_sent("reminder-9").unwrap_err();
        let state = load_state(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].id, "reminder-2");
        assert_eq!(missing.code(), "not_found");
        assert_eq!(state.reminders.len(), 2);
        assert!(state.reminders.iter().any(|r| r.id == "reminder-1" && r.sent));
    }

    #[test]
    fn registering_a_target_replaces_the_previous_one() {
        let path = temp_path("targets.json");
        let store = JsonStore::new(&path);
        store
            .register(PushTarget {
                owner_id: "user-1".to_string(),
                target: "token-old".to_string(),
                updated_at: datetime!(2024-03-01 00:00:00 UTC),
            })
            .unwrap();
        store
            .register(PushTarget {
                owner_id: "user-1".to_string(),
                target: "token-new".to_string(),
                updated_at: datetime!(2024-03-02 00:00:00 UTC),
            })
            .unwrap();

        let found = store.target_for("user-1").unwrap();
        let absent = store.target_for("user-2").unwrap();
        let state = load_state(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(found.map(|t| t.target), Some("token-new".to_string()));
        assert!(absent.is_none());
        assert_eq!(state.push_targets.len(), 1);
    }
}
