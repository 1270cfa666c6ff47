//! # Category lists shared by the notification translator and the worker.
//!
//! The lists and the current phase are the only state both tasks touch; they
//! live behind one mutex that is held for a single insert, removal or lookup
//! and never across an `.await`.
//!
//! ## Rules
//! - A process id is filed in at most one list.
//! - Late launches are adopted only while their category still has a phase ahead.

use std::collections::HashSet;

use crate::roster::{Category, ProcessId, ProcessRecord, ShutdownSnapshot};

use super::phase::ShutdownPhase;

#[derive(Debug)]
pub(crate) struct TrackedLists {
    pub(crate) phase: ShutdownPhase,
    user: Vec<ProcessRecord>,
    system: Vec<ProcessRecord>,
    background: Vec<ProcessRecord>,
    vital: HashSet<ProcessId>,
}

impl TrackedLists {
    pub(crate) fn new() -> Self {
        Self {
            phase: ShutdownPhase::UserApps,
            user: Vec::new(),
            system: Vec::new(),
            background: Vec::new(),
            vital: HashSet::new(),
        }
    }

    /// Files every record of `snapshot`; `self_process` is added to the vital set.
    pub(crate) fn from_snapshot(snapshot: ShutdownSnapshot, self_process: Option<ProcessId>) -> Self {
        let mut lists = Self::new();
        lists.vital = snapshot.vital;
        lists.vital.extend(self_process);

        let records = snapshot
            .user
            .into_iter()
            .map(|r| (Category::User, r))
            .chain(snapshot.system.into_iter().map(|r| (Category::System, r)))
            .chain(snapshot.background.into_iter().map(|r| (Category::Background, r)));
        for (category, mut record) in records {
            record.category = category;
            lists.insert(record);
        }
        lists
    }

    /// Files `record` under its category. Returns `false` if the process is
    /// already tracked (or vital).
    pub(crate) fn insert(&mut self, record: ProcessRecord) -> bool {
        if self.contains(record.process) || self.vital.contains(&record.process) {
            return false;
        }
        match record.category {
            Category::User => self.user.push(record),
            Category::System => self.system.push(record),
            Category::Background => self.background.push(record),
            Category::Vital => {
                self.vital.insert(record.process);
            }
        }
        true
    }

    /// Adopts a process launched during the sequence.
    ///
    /// User applications join while user applications are asked, system
    /// applications until the system phase, background applications until the
    /// background phase. Others are left to the catch-all phase.
    pub(crate) fn adopt(&mut self, record: ProcessRecord) -> bool {
        let accepted = match record.category {
            Category::User => self.phase == ShutdownPhase::UserApps,
            Category::System => self.phase <= ShutdownPhase::SystemApps,
            Category::Background => self.phase <= ShutdownPhase::BackgroundApps,
            Category::Vital => true,
        };
        accepted && self.insert(record)
    }

    pub(crate) fn remove(&mut self, process: ProcessId) -> Option<ProcessRecord> {
        for list in [&mut self.user, &mut self.system, &mut self.background] {
            if let Some(pos) = list.iter().position(|r| r.process == process) {
                return Some(list.remove(pos));
            }
        }
        None
    }

    pub(crate) fn contains(&self, process: ProcessId) -> bool {
        [&self.user, &self.system, &self.background]
            .iter()
            .any(|list| list.iter().any(|r| r.process == process))
    }

    pub(crate) fn list(&self, category: Category) -> &[ProcessRecord] {
        match category {
            Category::User => &self.user,
            Category::System => &self.system,
            Category::Background => &self.background,
            Category::Vital => &[],
        }
    }

    pub(crate) fn first(&self, category: Category) -> Option<ProcessRecord> {
        self.list(category).first().cloned()
    }

    pub(crate) fn vital(&self) -> &HashSet<ProcessId> {
        &self.vital
    }

    pub(crate) fn tracked(&self) -> usize {
        self.user.len() + self.system.len() + self.background.len()
    }
}

/// Processes the catch-all phase may signal and kill: every running process
/// except the vital ones, each once.
pub(crate) fn kill_candidates(running: &[ProcessId], vital: &HashSet<ProcessId>) -> Vec<ProcessId> {
    let mut seen = HashSet::new();
    running
        .iter()
        .copied()
        .filter(|pid| !vital.contains(pid) && seen.insert(*pid))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{ChannelPort, Messenger, PortId};
    use rand::Rng;
    use std::sync::Arc;

    fn record(pid: i32, category: Category) -> ProcessRecord {
        let (port, _rx) = ChannelPort::channel(PortId(pid as u32), 1);
        ProcessRecord::new(
            ProcessId(pid),
            Messenger::new(ProcessId(pid), Arc::new(port)),
            format!("app-{pid}"),
            category,
        )
    }

    #[test]
    fn a_process_is_filed_once() {
        let mut lists = TrackedLists::new();
        assert!(lists.insert(record(1, Category::User)));
        assert!(!lists.insert(record(1, Category::System)));
        assert_eq!(lists.list(Category::System).len(), 0);

        assert!(lists.remove(ProcessId(1)).is_some());
        assert!(lists.remove(ProcessId(1)).is_none());
        assert!(lists.insert(record(1, Category::System)));
    }

    #[test]
    fn snapshot_protects_self_process() {
        let snapshot = ShutdownSnapshot {
            user: vec![record(10, Category::User), record(2, Category::User)],
            ..ShutdownSnapshot::default()
        };
        let lists = TrackedLists::from_snapshot(snapshot, Some(ProcessId(2)));
        assert!(lists.vital().contains(&ProcessId(2)));
        assert!(!lists.contains(ProcessId(2)));
        assert_eq!(lists.tracked(), 1);
    }

    #[test]
    fn late_launches_follow_the_phase() {
        let mut lists = TrackedLists::new();
        lists.phase = ShutdownPhase::SystemApps;
        assert!(!lists.adopt(record(1, Category::User)));
        assert!(lists.adopt(record(2, Category::System)));
        assert!(lists.adopt(record(3, Category::Background)));

        lists.phase = ShutdownPhase::OtherProcesses;
        assert!(!lists.adopt(record(4, Category::Background)));
        assert!(lists.adopt(record(5, Category::Vital)));
        assert!(lists.vital().contains(&ProcessId(5)));
    }

    #[test]
    fn vital_processes_are_never_kill_candidates() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let mut lists = TrackedLists::new();
            let mut running = Vec::new();
            for pid in 1..rng.random_range(2..40) {
                let category = match rng.random_range(0..4) {
                    0 => Category::User,
                    1 => Category::System,
                    2 => Category::Background,
                    _ => Category::Vital,
                };
                lists.insert(record(pid, category));
                running.push(ProcessId(pid));
                if rng.random_bool(0.2) {
                    running.push(ProcessId(pid));
                }
            }

            let candidates = kill_candidates(&running, lists.vital());
            assert!(candidates.iter().all(|pid| !lists.vital().contains(pid)));
            let unique: HashSet<_> = candidates.iter().collect();
            assert_eq!(unique.len(), candidates.len());
            let expected = running
                .iter()
                .filter(|pid| !lists.vital().contains(pid))
                .collect::<HashSet<_>>()
                .len();
            assert_eq!(candidates.len(), expected);
        }
    }
}
