use chrono::NaiveDate;

use keeping_sync::domain::{Client, EntryId, Project, ReferenceData, Task, TimeEntry};
use keeping_sync::join::merge;

fn entry(id: u64, project_id: Option<u64>, task_id: Option<u64>) -> TimeEntry {
    TimeEntry {
        id: EntryId::new(id),
        date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        hours: Some(1.5),
        project_id,
        task_id,
    }
}

fn reference() -> ReferenceData {
    ReferenceData {
        projects: vec![
            Project {
                id: 10,
                name: "Website".to_string(),
                client_id: Some(100),
            },
            Project {
                id: 12,
                name: "Orphan".to_string(),
                client_id: Some(999),
            },
        ],
        tasks: vec![Task {
            id: 20,
            name: "Design".to_string(),
        }],
        clients: vec![Client {
            id: 100,
            name: "Acme".to_string(),
        }],
    }
}

#[test]
fn fills_names_from_all_three_tables() {
    let merged = merge(&[entry(501, Some(10), Some(20))], &reference());

    assert_eq!(merged.len(), 1);
    let record = &merged[0];
    assert_eq!(record.entry_id, EntryId::new(501));
    assert_eq!(record.hours, Some(1.5));
    assert_eq!(record.client.as_deref(), Some("Acme"));
    assert_eq!(record.project.as_deref(), Some("Website"));
    assert_eq!(record.task.as_deref(), Some("Design"));
}

#[test]
fn unknown_ids_leave_names_empty() {
    let merged = merge(
        &[
            entry(1, Some(77), Some(88)),
            entry(2, None, None),
            entry(3, Some(12), None),
        ],
        &reference(),
    );

    assert_eq!(merged.len(), 3);
    assert_eq!(merged[0].project, None);
    assert_eq!(merged[0].task, None);
    assert_eq!(merged[1].client, None);
    assert_eq!(merged[2].project.as_deref(), Some("Orphan"));
    assert_eq!(merged[2].client, None);
}

#[test]
fn empty_reference_tables_keep_every_entry() {
    let entries = vec![entry(1, Some(10), Some(20)), entry(2, Some(10), None)];

    let merged = merge(&entries, &ReferenceData::default());

    assert_eq!(merged.len(), entries.len());
    assert!(merged.iter().all(|record| record.project.is_none()));
}

#[test]
fn duplicate_reference_ids_do_not_multiply_rows() {
    let mut reference = reference();
    reference.projects.push(Project {
        id: 10,
        name: "Website (copy)".to_string(),
        client_id: None,
    });
    reference.clients.push(Client {
        id: 100,
        name: "Acme Holding".to_string(),
    });

    let merged = merge(&[entry(501, Some(10), None)], &reference);

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].project.as_deref(), Some("Website"));
    assert_eq!(merged[0].client.as_deref(), Some("Acme"));
}

#[test]
fn preserves_entry_order() {
    let merged = merge(
        &[entry(3, None, None), entry(1, None, None), entry(2, None, None)],
        &reference(),
    );

    let ids: Vec<u64> = merged.iter().map(|record| record.entry_id.get()).collect();
    assert_eq!(ids, vec![3, 1, 2]);
}
