use chrono::{DateTime, Duration, Utc};

use super::drag::DraggableLocation;
use crate::models::{Column, Lead};

/// One rendered column with its cards
#[derive(Debug, Clone, PartialEq)]
pub struct BoardColumn {
    pub column: Column,
    pub leads: Vec<Lead>,
}

/// Leads grouped into columns. Derived, never written back.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Board {
    pub columns: Vec<BoardColumn>,
    /// Leads whose status names no column
    pub unassigned: Vec<Lead>,
}

impl Board {
    /// Group `leads` by status into `columns`, ordered by position. Leads
    /// keep their relative order inside a column.
    pub fn build(columns: &[Column], leads: &[Lead]) -> Self {
        let mut ordered: Vec<Column> = columns.to_vec();
        ordered.sort_by_key(|c| c.position);

        let mut board = Board {
            columns: ordered
                .into_iter()
                .map(|column| BoardColumn {
                    column,
                    leads: Vec::new(),
                })
                .collect(),
            unassigned: Vec::new(),
        };

        for lead in leads {
            match board
                .columns
                .iter_mut()
                .find(|c| c.column.name == lead.status)
            {
                Some(column) => column.leads.push(lead.clone()),
                None => board.unassigned.push(lead.clone()),
            }
        }
        board
    }

    pub fn column(&self, name: &str) -> Option<&BoardColumn> {
        self.columns.iter().find(|c| c.column.name == name)
    }

    /// Where a lead's card sits, as a drag source
    pub fn locate(&self, lead_id: &str) -> Option<DraggableLocation> {
        self.columns.iter().find_map(|c| {
            c.leads
                .iter()
                .position(|l| l.id == lead_id)
                .map(|index| DraggableLocation::new(&c.column.name, index))
        })
    }

    /// `(column name, card count)` in display order
    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.columns
            .iter()
            .map(|c| (c.column.name.as_str(), c.leads.len()))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.columns.iter().map(|c| c.leads.len()).sum::<usize>() + self.unassigned.len()
    }
}

/// How long the lead has been in its current column
pub fn time_in_column(lead: &Lead, now: DateTime<Utc>) -> Duration {
    let elapsed = now - lead.entered_column_at();
    if elapsed < Duration::zero() {
        Duration::zero()
    } else {
        elapsed
    }
}

/// Compact rendering: `2d 3h`, `5h 12m`, `45m`, `<1m`
pub fn format_elapsed(elapsed: Duration) -> String {
    let days = elapsed.num_days();
    let hours = elapsed.num_hours() % 24;
    let minutes = elapsed.num_minutes() % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        "<1m".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(id: &str, name: &str, position: i32) -> Column {
        Column {
            id: id.to_string(),
            name: name.to_string(),
            position,
            created_at: None,
        }
    }

    fn lead(id: &str, status: &str, entered: DateTime<Utc>) -> Lead {
        Lead {
            id: id.to_string(),
            name: format!("Lead {}", id),
            email: "lead@example.com".to_string(),
            phone: "11999990000".to_string(),
            notes: None,
            status: status.to_string(),
            status_changed_at: Some(entered),
            source: None,
            created_at: entered,
            updated_at: None,
        }
    }

    #[test]
    fn groups_by_status_in_position_order() {
        let now = Utc::now();
        let columns = vec![
            column("C2", "Em Andamento", 1),
            column("C1", "Novo", 0),
        ];
        let leads = vec![
            lead("L1", "Novo", now),
            lead("L2", "Em Andamento", now),
            lead("L3", "Novo", now),
            lead("L4", "Arquivado", now),
        ];

        let board = Board::build(&columns, &leads);

        assert_eq!(board.counts(), vec![("Novo", 2), ("Em Andamento", 1)]);
        assert_eq!(board.unassigned.len(), 1);
        assert_eq!(board.total(), 4);
        assert_eq!(board.locate("L3"), Some(DraggableLocation::new("Novo", 1)));
        assert_eq!(board.locate("L4"), None);
    }

    #[test]
    fn time_in_column_uses_status_change() {
        let now = Utc::now();
        let mut l = lead("L1", "Novo", now - Duration::hours(50));
        l.status_changed_at = Some(now - Duration::minutes(90));

        let elapsed = time_in_column(&l, now);
        assert_eq!(elapsed.num_minutes(), 90);
        assert_eq!(format_elapsed(elapsed), "1h 30m");
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::hours(51)), "2d 3h");
        assert_eq!(format_elapsed(Duration::minutes(45)), "45m");
        assert_eq!(format_elapsed(Duration::seconds(20)), "<1m");
    }

    #[test]
    fn clock_skew_never_goes_negative() {
        let now = Utc::now();
        let l = lead("L1", "Novo", now + Duration::minutes(5));
        assert_eq!(time_in_column(&l, now), Duration::zero());
    }
}
