//! Core type definitions for the simulation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of an organism inside the ecosystem arena.
///
/// Ids are issued in increasing order and never reused, so a handle to a
/// swept organism can never alias a newborn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrganismId(pub u64);

impl fmt::Display for OrganismId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cell of the biotope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn add(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// True if the coordinate lies inside a `width` x `height` grid
    pub fn is_within(&self, width: i32, height: i32) -> bool {
        self.x >= 0 && self.y >= 0 && self.x < width && self.y < height
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Direction towards one of the eight Moore neighbors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Direction {
    pub fn to_delta(&self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::South => (0, 1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
            Direction::NorthEast => (1, -1),
            Direction::NorthWest => (-1, -1),
            Direction::SouthEast => (1, 1),
            Direction::SouthWest => (-1, 1),
        }
    }

    pub fn all() -> [Direction; 8] {
        [
            Direction::North,
            Direction::South,
            Direction::East,
            Direction::West,
            Direction::NorthEast,
            Direction::NorthWest,
            Direction::SouthEast,
            Direction::SouthWest,
        ]
    }
}

/// Coarse ecological role; decides who eats whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Producer,
    Prey,
    Predator,
}

impl Category {
    /// Category one level down the food chain, if any
    pub fn food(&self) -> Option<Category> {
        match self {
            Category::Producer => None,
            Category::Prey => Some(Category::Producer),
            Category::Predator => Some(Category::Prey),
        }
    }

    /// Producers neither hunt nor move
    pub fn is_sessile(&self) -> bool {
        matches!(self, Category::Producer)
    }

    /// Letter used by renderers and time-slice exports
    pub fn symbol(&self) -> char {
        match self {
            Category::Producer => 'P',
            Category::Prey => 'H',
            Category::Predator => 'C',
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Producer => "producer",
            Category::Prey => "prey",
            Category::Predator => "predator",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CauseOfDeath {
    Starvation,
    OldAge,
    Predation,
}

impl fmt::Display for CauseOfDeath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CauseOfDeath::Starvation => "starvation",
            CauseOfDeath::OldAge => "old_age",
            CauseOfDeath::Predation => "predation",
        };
        f.write_str(name)
    }
}

/// Lifecycle state. `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifeState {
    Alive,
    Dead(CauseOfDeath),
}

impl LifeState {
    pub fn is_alive(&self) -> bool {
        matches!(self, LifeState::Alive)
    }

    pub fn cause_of_death(&self) -> Option<CauseOfDeath> {
        match self {
            LifeState::Alive => None,
            LifeState::Dead(cause) => Some(*cause),
        }
    }
}

/// Energy-consuming action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Move,
    Hunt,
    Procreate,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Move => "move",
            ActionKind::Hunt => "hunt",
            ActionKind::Procreate => "procreate",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_bounds() {
        assert!(Coordinate::new(0, 0).is_within(10, 10));
        assert!(Coordinate::new(9, 9).is_within(10, 10));
        assert!(!Coordinate::new(-1, 0).is_within(10, 10));
        assert!(!Coordinate::new(10, 3).is_within(10, 10));
    }

    #[test]
    fn test_directions_cover_moore_neighborhood() {
        let mut deltas: Vec<_> = Direction::all().iter().map(|d| d.to_delta()).collect();
        deltas.sort();
        deltas.dedup();
        assert_eq!(deltas.len(), 8);
        assert!(!deltas.contains(&(0, 0)));
        assert!(deltas
            .iter()
            .all(|(dx, dy)| dx.abs() <= 1 && dy.abs() <= 1));
    }

    #[test]
    fn test_food_chain() {
        assert_eq!(Category::Predator.food(), Some(Category::Prey));
        assert_eq!(Category::Prey.food(), Some(Category::Producer));
        assert_eq!(Category::Producer.food(), None);
    }

    #[test]
    fn test_life_state() {
        assert!(LifeState::Alive.is_alive());
        assert_eq!(LifeState::Alive.cause_of_death(), None);

        let dead = LifeState::Dead(CauseOfDeath::Predation);
        assert!(!dead.is_alive());
        assert_eq!(dead.cause_of_death(), Some(CauseOfDeath::Predation));
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&Category::Predator).unwrap();
        assert_eq!(json, "\"predator\"");
        let cause: CauseOfDeath = serde_json::from_str("\"old_age\"").unwrap();
        assert_eq!(cause, CauseOfDeath::OldAge);
    }
}
