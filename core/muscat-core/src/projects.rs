//! Registry of opened repositories.
//!
//! Persisted with the same best-effort discipline as lineage and positions:
//! an unreadable document means "no projects yet".

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::Clock;
use crate::identity::{tagged_id, PROJECT_TAG};
use crate::storage::{load_document, save_document, SharedStore, PROJECTS_KEY};
use crate::validation::repo_name_from_path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: String,
    pub last_opened: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProjectsFile {
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    active_project_id: Option<String>,
}

pub struct ProjectRegistry {
    file: ProjectsFile,
    backend: SharedStore,
    clock: Arc<dyn Clock>,
}

impl ProjectRegistry {
    pub fn load(backend: SharedStore, clock: Arc<dyn Clock>) -> Self {
        let file = load_document(backend.as_ref(), PROJECTS_KEY);
        Self {
            file,
            backend,
            clock,
        }
    }

    /// Opens `path` as a project and makes it active.
    ///
    /// A path that is already registered is re-activated and touched instead
    /// of duplicated. `name` defaults to the last path component.
    pub fn add(&mut self, path: &str, name: Option<&str>) -> Project {
        let now = self.clock.now();
        if let Some(existing) = self.file.projects.iter_mut().find(|p| p.path == path) {
            existing.last_opened = now;
            let project = existing.clone();
            self.file.active_project_id = Some(project.id.clone());
            self.persist();
            return project;
        }

        let project = Project {
            id: tagged_id(PROJECT_TAG, path),
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| repo_name_from_path(path)),
            path: path.to_string(),
            last_opened: now,
        };
        self.file.projects.push(project.clone());
        self.file.active_project_id = Some(project.id.clone());
        self.persist();
        tracing::info!(path, id = %project.id, "Added project");
        project
    }

    /// Removes a project. If it was active, the first remaining project
    /// becomes active.
    pub fn remove(&mut self, id: &str) {
        let before = self.file.projects.len();
        self.file.projects.retain(|p| p.id != id);
        if self.file.projects.len() == before {
            return;
        }
        if self.file.active_project_id.as_deref() == Some(id) {
            self.file.active_project_id = self.file.projects.first().map(|p| p.id.clone());
        }
        self.persist();
    }

    pub fn set_active(&mut self, id: Option<&str>) {
        self.file.active_project_id = id.map(str::to_string);
        match id {
            Some(id) => self.touch(id),
            None => self.persist(),
        }
    }

    /// Refreshes `last_opened` for a project.
    pub fn touch(&mut self, id: &str) {
        let now = self.clock.now();
        if let Some(project) = self.file.projects.iter_mut().find(|p| p.id == id) {
            project.last_opened = now;
        }
        self.persist();
    }

    pub fn active(&self) -> Option<&Project> {
        let id = self.file.active_project_id.as_deref()?;
        self.file.projects.iter().find(|p| p.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Project> {
        self.file.projects.iter().find(|p| p.id == id)
    }

    /// Projects in insertion order.
    pub fn projects(&self) -> &[Project] {
        &self.file.projects
    }

    /// Projects, most recently opened first.
    pub fn recent(&self) -> Vec<&Project> {
        let mut projects: Vec<&Project> = self.file.projects.iter().collect();
        projects.sort_by(|a, b| b.last_opened.cmp(&a.last_opened));
        projects
    }

    fn persist(&self) {
        save_document(self.backend.as_ref(), PROJECTS_KEY, &self.file);
    }
}
