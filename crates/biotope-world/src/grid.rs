//! Bounded 2D grid for the biotope.
//!
//! Every cell is either occupied by exactly one organism or listed in the
//! free set. The free set is kept as a dense vector plus a per-cell slot
//! index so that uniform sampling, insertion and removal are all O(1).

use biotope_core::{BiotopeConfig, Coordinate, Direction, Error, OrganismId, Result};
use rand::Rng;

/// A bounded rectangular grid with an occupied/free partition
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    pub width: i32,
    pub height: i32,
    occupants: Vec<Option<OrganismId>>,
    free: Vec<Coordinate>,
    free_slots: Vec<Option<usize>>,
}

impl SpatialGrid {
    /// Callers bound the dimensions first (see [`biotope_core::grid_cells`])
    pub fn new(width: i32, height: i32) -> Self {
        let size = (width.max(0) as usize) * (height.max(0) as usize);
        let mut grid = Self {
            width,
            height,
            occupants: vec![None; size],
            free: Vec::with_capacity(size),
            free_slots: vec![None; size],
        };

        for index in 0..size {
            let coordinate = grid.index_to_coordinate(index);
            grid.free_slots[index] = Some(grid.free.len());
            grid.free.push(coordinate);
        }

        grid
    }

    pub fn from_config(config: &BiotopeConfig) -> Self {
        Self::new(config.width, config.height)
    }

    pub fn contains(&self, coordinate: Coordinate) -> bool {
        coordinate.is_within(self.width, self.height)
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.occupants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.len() - self.free.len()
    }

    pub fn is_free(&self, coordinate: Coordinate) -> bool {
        self.index_of(coordinate)
            .map(|index| self.occupants[index].is_none())
            .unwrap_or(false)
    }

    pub fn occupant(&self, coordinate: Coordinate) -> Option<OrganismId> {
        self.index_of(coordinate)
            .and_then(|index| self.occupants[index])
    }

    /// Place `id` on a free cell
    pub fn occupy(&mut self, coordinate: Coordinate, id: OrganismId) -> Result<()> {
        let index = self
            .index_of(coordinate)
            .ok_or_else(|| Error::invalid_coordinate(coordinate, "outside the biotope"))?;

        if let Some(current) = self.occupants[index] {
            return Err(Error::invalid_coordinate(
                coordinate,
                format!("already occupied by {}", current),
            ));
        }

        self.take_free_slot(index);
        self.occupants[index] = Some(id);
        Ok(())
    }

    /// Release an occupied cell, returning its former occupant
    pub fn vacate(&mut self, coordinate: Coordinate) -> Result<OrganismId> {
        let index = self
            .index_of(coordinate)
            .ok_or_else(|| Error::invalid_coordinate(coordinate, "outside the biotope"))?;

        let id = self.occupants[index]
            .take()
            .ok_or_else(|| Error::invalid_coordinate(coordinate, "cell is not occupied"))?;

        self.free_slots[index] = Some(self.free.len());
        self.free.push(coordinate);
        Ok(id)
    }

    /// Move the occupant of `from` to `to`. Both cells are checked before
    /// anything changes, so a failed move leaves the grid untouched.
    pub fn relocate(&mut self, from: Coordinate, to: Coordinate) -> Result<OrganismId> {
        if self.occupant(from).is_none() {
            return Err(Error::invalid_coordinate(from, "no organism to move"));
        }
        if !self.contains(to) {
            return Err(Error::invalid_coordinate(to, "outside the biotope"));
        }
        if let Some(current) = self.occupant(to) {
            return Err(Error::invalid_coordinate(
                to,
                format!("already occupied by {}", current),
            ));
        }

        let id = self.vacate(from)?;
        self.occupy(to, id)?;
        Ok(id)
    }

    /// Uniformly sample a free cell
    pub fn random_free<R: Rng>(&self, rng: &mut R) -> Result<Coordinate> {
        if self.free.is_empty() {
            return Err(Error::NoFreeSpace);
        }
        Ok(self.free[rng.gen_range(0..self.free.len())])
    }

    /// Moore neighborhood of `center`, clipped to the grid
    pub fn neighbors(&self, center: Coordinate) -> impl Iterator<Item = Coordinate> + '_ {
        Direction::all()
            .into_iter()
            .map(move |direction| {
                let (dx, dy) = direction.to_delta();
                center.add(dx, dy)
            })
            .filter(move |coordinate| self.contains(*coordinate))
    }

    pub fn free_neighbors(&self, center: Coordinate) -> Vec<Coordinate> {
        self.neighbors(center)
            .filter(|coordinate| self.is_free(*coordinate))
            .collect()
    }

    pub fn occupied_neighbors(&self, center: Coordinate) -> Vec<(Coordinate, OrganismId)> {
        self.neighbors(center)
            .filter_map(|coordinate| self.occupant(coordinate).map(|id| (coordinate, id)))
            .collect()
    }

    /// True if occupied and free cells partition the grid exactly
    pub fn is_consistent(&self) -> bool {
        if self.free.len() > self.len() {
            return false;
        }
        self.occupants.iter().enumerate().all(|(index, occupant)| {
            match (occupant, self.free_slots[index]) {
                (Some(_), None) => true,
                (None, Some(slot)) => self
                    .free
                    .get(slot)
                    .map(|c| *c == self.index_to_coordinate(index))
                    .unwrap_or(false),
                _ => false,
            }
        })
    }

    fn take_free_slot(&mut self, index: usize) {
        if let Some(slot) = self.free_slots[index].take() {
            self.free.swap_remove(slot);
            if let Some(moved) = self.free.get(slot).copied() {
                let moved_index = self.coordinate_to_index(moved);
                self.free_slots[moved_index] = Some(slot);
            }
        }
    }

    fn index_of(&self, coordinate: Coordinate) -> Option<usize> {
        self.contains(coordinate)
            .then(|| self.coordinate_to_index(coordinate))
    }

    fn coordinate_to_index(&self, coordinate: Coordinate) -> usize {
        (coordinate.y * self.width + coordinate.x) as usize
    }

    /// Get coordinate from index
    pub fn index_to_coordinate(&self, index: usize) -> Coordinate {
        let x = (index as i32) % self.width;
        let y = (index as i32) / self.width;
        Coordinate::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_grid_creation() {
        let grid = SpatialGrid::new(10, 10);
        assert_eq!(grid.width, 10);
        assert_eq!(grid.height, 10);
        assert_eq!(grid.len(), 100);
        assert_eq!(grid.free_count(), 100);
        assert_eq!(grid.occupied_count(), 0);
        assert!(grid.is_consistent());
    }

    #[test]
    fn test_occupy_and_vacate() {
        let mut grid = SpatialGrid::new(10, 10);
        let pos = Coordinate::new(5, 5);

        grid.occupy(pos, OrganismId(1)).unwrap();
        assert_eq!(grid.occupant(pos), Some(OrganismId(1)));
        assert!(!grid.is_free(pos));
        assert_eq!(grid.free_count(), 99);

        assert_eq!(grid.vacate(pos).unwrap(), OrganismId(1));
        assert!(grid.is_free(pos));
        assert_eq!(grid.free_count(), 100);
        assert!(grid.is_consistent());
    }

    #[test]
    fn test_occupy_rejects_invalid_targets() {
        let mut grid = SpatialGrid::new(4, 4);
        grid.occupy(Coordinate::new(1, 1), OrganismId(1)).unwrap();

        let occupied = grid.occupy(Coordinate::new(1, 1), OrganismId(2));
        assert!(matches!(occupied, Err(Error::InvalidCoordinate { .. })));

        let outside = grid.occupy(Coordinate::new(4, 0), OrganismId(2));
        assert!(matches!(outside, Err(Error::InvalidCoordinate { .. })));

        assert_eq!(grid.occupied_count(), 1);
        assert!(grid.is_consistent());
    }

    #[test]
    fn test_relocate_is_atomic() {
        let mut grid = SpatialGrid::new(5, 5);
        grid.occupy(Coordinate::new(0, 0), OrganismId(1)).unwrap();
        grid.occupy(Coordinate::new(1, 0), OrganismId(2)).unwrap();

        let blocked = grid.relocate(Coordinate::new(0, 0), Coordinate::new(1, 0));
        assert!(blocked.is_err());
        assert_eq!(grid.occupant(Coordinate::new(0, 0)), Some(OrganismId(1)));

        let moved = grid
            .relocate(Coordinate::new(0, 0), Coordinate::new(0, 1))
            .unwrap();
        assert_eq!(moved, OrganismId(1));
        assert!(grid.is_free(Coordinate::new(0, 0)));
        assert_eq!(grid.occupant(Coordinate::new(0, 1)), Some(OrganismId(1)));
        assert!(grid.is_consistent());
    }

    #[test]
    fn test_neighbors_are_clipped() {
        let grid = SpatialGrid::new(10, 10);
        assert_eq!(grid.neighbors(Coordinate::new(5, 5)).count(), 8);
        assert_eq!(grid.neighbors(Coordinate::new(0, 0)).count(), 3);
        assert_eq!(grid.neighbors(Coordinate::new(9, 5)).count(), 5);
    }

    #[test]
    fn test_free_and_occupied_neighbors() {
        let mut grid = SpatialGrid::new(3, 3);
        let center = Coordinate::new(1, 1);
        grid.occupy(center, OrganismId(0)).unwrap();
        grid.occupy(Coordinate::new(0, 0), OrganismId(1)).unwrap();
        grid.occupy(Coordinate::new(2, 2), OrganismId(2)).unwrap();

        assert_eq!(grid.free_neighbors(center).len(), 6);
        let occupied = grid.occupied_neighbors(center);
        assert_eq!(occupied.len(), 2);
        assert!(occupied.contains(&(Coordinate::new(0, 0), OrganismId(1))));
        assert!(!occupied.iter().any(|(c, _)| *c == center));
    }

    #[test]
    fn test_random_free_on_full_grid() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut grid = SpatialGrid::new(2, 2);
        for (i, pos) in [(0, 0), (1, 0), (0, 1)].into_iter().enumerate() {
            grid.occupy(Coordinate::new(pos.0, pos.1), OrganismId(i as u64))
                .unwrap();
        }

        assert_eq!(grid.random_free(&mut rng).unwrap(), Coordinate::new(1, 1));

        grid.occupy(Coordinate::new(1, 1), OrganismId(3)).unwrap();
        assert!(matches!(grid.random_free(&mut rng), Err(Error::NoFreeSpace)));
    }

    proptest! {
        #[test]
        fn prop_partition_holds(ops in proptest::collection::vec((0i32..6, 0i32..6, any::<bool>()), 0..200)) {
            let mut grid = SpatialGrid::new(6, 6);
            let mut next = 0u64;

            for (x, y, place) in ops {
                let pos = Coordinate::new(x, y);
                if place {
                    let _ = grid.occupy(pos, OrganismId(next));
                    next += 1;
                } else {
                    let _ = grid.vacate(pos);
                }

                prop_assert_eq!(grid.occupied_count() + grid.free_count(), 36);
                prop_assert!(grid.is_consistent());
            }
        }
    }
}
