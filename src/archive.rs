use crate::domain::task::Task;
use crate::store::{Store, StoreError};

/// Moves every done task from `primary` into `archive` and returns how many moved.
///
/// Locks are taken primary first, then archive. The archive is persisted before
/// the primary so a crash in between leaves the moved tasks in at least one
/// document.
pub fn archive_done(primary: &Store, archive: &Store) -> Result<usize, StoreError> {
    let primary_guard = primary.lock()?;
    let mut document = primary.load()?;
    let (moved, kept): (Vec<Task>, Vec<Task>) = document
        .tasks
        .drain(..)
        .partition(|task| task.done);
    if moved.is_empty() {
        return Ok(0);
    }

    let archive_guard = archive.lock()?;
    let mut archived = archive.load()?;
    archived.tasks.extend(moved.iter().cloned());
    archived.next_id = archived.next_id.max(archived.max_id() + 1);
    archive.save(&archived)?;

    document.tasks = kept;
    primary.save(&document)?;
    drop(archive_guard);
    drop(primary_guard);

    tracing::info!(
        moved = moved.len(),
        archive = %archive.path().display(),
        "archived done tasks"
    );
    Ok(moved.len())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::archive_done;
    use crate::backups::BackupRotator;
    use crate::document::Document;
    use crate::domain::task::Task;
    use crate::store::{archive_path_for, Store};

    fn stores() -> (PathBuf, Store, Store) {
        let root = std::env::temp_dir().join(format!("todo-archive-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&root).expect("workspace should be creatable");
        let primary_path = root.join("todos.json");
        let archive = Store::new(archive_path_for(&primary_path), BackupRotator::default());
        let primary = Store::new(primary_path, BackupRotator::default());
        (root, primary, archive)
    }

    fn seed(primary: &Store, done_flags: &[bool]) -> Document {
        let mut document = Document::default();
        for (index, done) in done_flags.iter().enumerate() {
            let mut task = Task::new(0, &format!("task {index}"), "2024-01-01T00:00:00Z");
            task.set_done(*done, "2024-01-02T00:00:00Z");
            document.push_new(task);
        }
        primary.save(&document).expect("seed primary");
        document
    }

    #[test]
    fn nothing_done_is_a_no_op() {
        let (root, primary, archive) = stores();
        seed(&primary, &[false, false]);
        let before = std::fs::read(primary.path()).expect("read");

        assert_eq!(archive_done(&primary, &archive).expect("archive"), 0);
        assert_eq!(std::fs::read(primary.path()).expect("read"), before);
        assert!(!archive.path().exists());
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn done_tasks_move_with_their_ids() {
        let (root, primary, archive) = stores();
        let seeded = seed(&primary, &[true, false, true]);

        assert_eq!(archive_done(&primary, &archive).expect("archive"), 2);
        let remaining = primary.load().expect("primary");
        let archived = archive.load().expect("archive");
        assert_eq!(remaining.tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(archived.tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(archived.next_id, 4);
        assert_eq!(remaining.next_id, seeded.next_id);
        assert_eq!(archived.tasks[0], seeded.tasks[0]);
        assert_eq!(
            remaining.tasks.len() + archived.tasks.len(),
            seeded.tasks.len()
        );
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn repeated_archiving_appends_and_keeps_counter_above_max() {
        let (root, primary, archive) = stores();
        seed(&primary, &[true]);
        archive_done(&primary, &archive).expect("first archive");

        primary
            .update(|document| {
                let mut task = Task::new(0, "later", "2024-02-01T00:00:00Z");
                task.set_done(true, "2024-02-02T00:00:00Z");
                document.push_new(task);
                Ok::<_, crate::store::StoreError>(())
            })
            .expect("add later task");
        assert_eq!(archive_done(&primary, &archive).expect("second archive"), 1);

        let archived = archive.load().expect("archive");
        assert_eq!(archived.tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(archived.next_id, 3);
        assert!(primary.load().expect("primary").tasks.is_empty());
        let _ = std::fs::remove_dir_all(root);
    }
}
