//! Left-joins time entries with the Keeping reference tables.

use std::collections::HashMap;

use crate::domain::{MergedRecord, ReferenceData, TimeEntry};

struct ProjectInfo<'a> {
    name: &'a str,
    client: Option<&'a str>,
}

/// Produces exactly one record per entry. Unknown project, task or client ids
/// leave the matching name empty. When a reference table repeats an id the
/// first occurrence is used.
pub fn merge(entries: &[TimeEntry], reference: &ReferenceData) -> Vec<MergedRecord> {
    let mut clients = HashMap::with_capacity(reference.clients.len());
    for client in &reference.clients {
        clients.entry(client.id).or_insert(client.name.as_str());
    }

    let mut projects = HashMap::with_capacity(reference.projects.len());
    for project in &reference.projects {
        projects.entry(project.id).or_insert_with(|| ProjectInfo {
            name: project.name.as_str(),
            client: project
                .client_id
                .and_then(|id| clients.get(&id).copied()),
        });
    }

    let mut tasks = HashMap::with_capacity(reference.tasks.len());
    for task in &reference.tasks {
        tasks.entry(task.id).or_insert(task.name.as_str());
    }

    entries
        .iter()
        .map(|entry| {
            let project = entry.project_id.and_then(|id| projects.get(&id));
            let task = entry.task_id.and_then(|id| tasks.get(&id).copied());
            MergedRecord {
                entry_id: entry.id,
                date: entry.date,
                hours: entry.hours,
                client: project.and_then(|p| p.client).map(str::to_string),
                project: project.map(|p| p.name.to_string()),
                task: task.map(str::to_string),
            }
        })
        .collect()
}
