/// A port belongs to exactly one of two directions, derived from where its id
/// falls relative to `max_input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// Sentinel returned by [`PortTable::free_port`] when the direction is
/// saturated.
pub const INVALID_PORT: u32 = u32::MAX;

/// Per-direction ordered index of port ids advertised by the element, with
/// derived "free port id" allocation. Input ids occupy `[0, max_input)`,
/// output ids occupy `[max_input, max_input + max_output)`.
#[derive(Debug, Clone, Default)]
pub struct PortTable {
    max_input: u32,
    max_output: u32,
    input_ids: Vec<u32>,
    output_ids: Vec<u32>,
}

impl PortTable {
    pub fn new() -> PortTable {
        PortTable::default()
    }

    pub fn n_input(&self) -> usize {
        self.input_ids.len()
    }

    pub fn n_output(&self) -> usize {
        self.output_ids.len()
    }

    pub fn max_input(&self) -> u32 {
        self.max_input
    }

    pub fn max_output(&self) -> u32 {
        self.max_output
    }

    pub fn input_ids(&self) -> &[u32] {
        &self.input_ids
    }

    pub fn output_ids(&self) -> &[u32] {
        &self.output_ids
    }

    /// Reload the table from a fresh element snapshot. `input_ids`/
    /// `output_ids` are expected sorted ascending; callers coming from
    /// the element's own enumeration are trusted to provide that.
    pub fn refresh(
        &mut self,
        max_input: u32,
        max_output: u32,
        input_ids: Vec<u32>,
        output_ids: Vec<u32>,
    ) {
        self.max_input = max_input;
        self.max_output = max_output;
        self.input_ids = input_ids;
        self.output_ids = output_ids;
    }

    /// A port's direction, derived from its id relative to `max_input`.
    pub fn direction_of(&self, id: u32) -> Direction {
        if id < self.max_input {
            Direction::Input
        } else {
            Direction::Output
        }
    }

    /// Smallest unused id within the direction's numeric range, walking the
    /// sorted id array until a gap is found. Returns [`INVALID_PORT`] when
    /// the direction is saturated (`n == max`).
    pub fn free_port(&self, direction: Direction) -> u32 {
        let (base, max, ids) = match direction {
            Direction::Input => (0u32, self.max_input, &self.input_ids),
            Direction::Output => (self.max_input, self.max_input + self.max_output, &self.output_ids),
        };
        if ids.len() as u32 >= max - base {
            return INVALID_PORT;
        }
        let mut candidate = base;
        for &id in ids {
            if id != candidate {
                break;
            }
            candidate += 1;
        }
        if candidate < max {
            candidate
        } else {
            INVALID_PORT
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn direction_splits_on_max_input() {
        let mut table = PortTable::new();
        table.refresh(2, 2, vec![0, 1], vec![2, 3]);
        assert_eq!(table.direction_of(0), Direction::Input);
        assert_eq!(table.direction_of(1), Direction::Input);
        assert_eq!(table.direction_of(2), Direction::Output);
        assert_eq!(table.direction_of(3), Direction::Output);
    }

    #[test]
    fn free_port_finds_first_gap() {
        let mut table = PortTable::new();
        table.refresh(4, 4, vec![0, 2, 3], vec![]);
        assert_eq!(table.free_port(Direction::Input), 1);
    }

    #[test]
    fn free_port_appends_when_no_gap() {
        let mut table = PortTable::new();
        table.refresh(4, 4, vec![0, 1], vec![]);
        assert_eq!(table.free_port(Direction::Input), 2);
    }

    #[test]
    fn free_port_saturated_is_invalid() {
        let mut table = PortTable::new();
        table.refresh(2, 0, vec![0, 1], vec![]);
        assert_eq!(table.free_port(Direction::Input), INVALID_PORT);
        assert_eq!(table.free_port(Direction::Output), INVALID_PORT);
    }

    #[test]
    fn free_port_output_base_offset_by_max_input() {
        let mut table = PortTable::new();
        table.refresh(2, 2, vec![0, 1], vec![]);
        assert_eq!(table.free_port(Direction::Output), 2);
    }
}
