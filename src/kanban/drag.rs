use serde::{Deserialize, Serialize};

/// A position on the board: column name plus index inside the column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraggableLocation {
    pub droppable_id: String,
    pub index: usize,
}

impl DraggableLocation {
    pub fn new(column: &str, index: usize) -> Self {
        Self {
            droppable_id: column.to_string(),
            index,
        }
    }
}

/// What the drag library reports when the user releases a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragEnd {
    /// Id of the dragged lead
    pub draggable_id: String,
    pub source: DraggableLocation,
    /// `None` when the card was dropped outside every column
    #[serde(default)]
    pub destination: Option<DraggableLocation>,
}

/// Why a drag-end produced no store call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoDestination,
    SamePosition,
    /// Reordering inside a column; positions are not persisted
    SameColumn,
    /// Another drag is still being processed
    Busy,
}

/// Classification of a drag-end before any store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragIntent<'a> {
    Ignore(IgnoreReason),
    Move { lead_id: &'a str, to: &'a str },
}

impl DragEnd {
    pub fn new(lead_id: &str, source: DraggableLocation, destination: Option<DraggableLocation>) -> Self {
        Self {
            draggable_id: lead_id.to_string(),
            source,
            destination,
        }
    }

    pub fn intent(&self) -> DragIntent<'_> {
        let Some(destination) = &self.destination else {
            return DragIntent::Ignore(IgnoreReason::NoDestination);
        };
        if destination.droppable_id == self.source.droppable_id {
            if destination.index == self.source.index {
                return DragIntent::Ignore(IgnoreReason::SamePosition);
            }
            return DragIntent::Ignore(IgnoreReason::SameColumn);
        }
        DragIntent::Move {
            lead_id: &self.draggable_id,
            to: &destination.droppable_id,
        }
    }
}
