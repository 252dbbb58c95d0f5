//! Class list with provisional attendee counts.
//!
//! After a reserve or cancel succeeds the affected class gets a provisional
//! ±1 until the next authoritative fetch, which overwrites everything.

use shared::Class;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassEntry {
    pub class: Class,
    delta: i64,
}

impl ClassEntry {
    /// Attendee count including any provisional change, within `[0, capacity]`
    pub fn attendees(&self) -> u32 {
        let count = i64::from(self.class.current_attendees) + self.delta;
        count.clamp(0, i64::from(self.class.capacity)) as u32
    }

    pub fn is_provisional(&self) -> bool {
        self.delta != 0
    }

    pub fn spots_left(&self) -> u32 {
        self.class.capacity.saturating_sub(self.attendees())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassBoard {
    entries: Vec<ClassEntry>,
}

impl ClassBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the board with an authoritative list, dropping all provisional deltas
    pub fn reconcile(&mut self, classes: Vec<Class>) {
        self.entries = classes
            .into_iter()
            .map(|class| ClassEntry { class, delta: 0 })
            .collect();
    }

    pub fn entries(&self) -> &[ClassEntry] {
        &self.entries
    }

    pub fn get(&self, class_id: &str) -> Option<&ClassEntry> {
        self.entries.iter().find(|e| e.class.id == class_id)
    }

    pub fn apply_reserved(&mut self, class_id: &str) -> bool {
        self.shift(class_id, 1)
    }

    pub fn apply_cancelled(&mut self, class_id: &str) -> bool {
        self.shift(class_id, -1)
    }

    /// Returns false when the class is not on the board
    fn shift(&mut self, class_id: &str, step: i64) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.class.id == class_id) else {
            return false;
        };
        let current = i64::from(entry.attendees());
        let target = (current + step).clamp(0, i64::from(entry.class.capacity));
        entry.delta += target - current;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn class(id: &str, capacity: u32, attendees: u32) -> Class {
        Class {
            id: id.to_string(),
            name: "Spin".to_string(),
            description: None,
            instructor: "Luis".to_string(),
            start_time: Utc::now(),
            duration_minutes: Some(45),
            capacity,
            current_attendees: attendees,
            branch_name: "Centro".to_string(),
        }
    }

    #[test]
    fn test_reserve_is_provisional_until_reconcile() {
        let mut board = ClassBoard::new();
        board.reconcile(vec![class("c1", 10, 3)]);

        assert!(board.apply_reserved("c1"));
        let entry = board.get("c1").unwrap();
        assert_eq!(entry.attendees(), 4);
        assert!(entry.is_provisional());

        // The server counted differently; its number wins
        board.reconcile(vec![class("c1", 10, 7)]);
        let entry = board.get("c1").unwrap();
        assert_eq!(entry.attendees(), 7);
        assert!(!entry.is_provisional());
    }

    #[test]
    fn test_deltas_are_clamped() {
        let mut board = ClassBoard::new();
        board.reconcile(vec![class("full", 2, 2), class("empty", 5, 0)]);

        board.apply_reserved("full");
        assert_eq!(board.get("full").unwrap().attendees(), 2);
        assert_eq!(board.get("full").unwrap().spots_left(), 0);

        board.apply_cancelled("empty");
        assert_eq!(board.get("empty").unwrap().attendees(), 0);
        assert!(!board.get("empty").unwrap().is_provisional());

        // A clamped step must not leave a hidden delta behind
        board.apply_reserved("empty");
        assert_eq!(board.get("empty").unwrap().attendees(), 1);
    }

    #[test]
    fn test_reserve_then_cancel_cancels_out() {
        let mut board = ClassBoard::new();
        board.reconcile(vec![class("c1", 10, 3)]);
        board.apply_reserved("c1");
        board.apply_cancelled("c1");
        assert_eq!(board.get("c1").unwrap().attendees(), 3);
        assert!(!board.get("c1").unwrap().is_provisional());
    }

    #[test]
    fn test_unknown_class_is_ignored() {
        let mut board = ClassBoard::new();
        assert!(!board.apply_reserved("missing"));
    }
}
