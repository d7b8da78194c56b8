//! Assignment of aggregated interrupt lines to CPU interrupt inputs.

use std::collections::BTreeMap;

use super::{EventManager, IrqError};

/// Named reservations of CPU interrupt lines.
#[derive(Debug, Clone)]
pub struct InterruptMap {
    lines: u32,
    /// Name -> line
    entries: BTreeMap<String, u32>,
}

impl InterruptMap {
    /// Map for a CPU with `lines` interrupt inputs (at most 32).
    pub fn new(lines: u32) -> Self {
        Self {
            lines: lines.min(32),
            entries: BTreeMap::new(),
        }
    }

    pub fn lines(&self) -> u32 {
        self.lines
    }

    /// Reserve a line for `name`: the given one, or the lowest free line.
    pub fn add(&mut self, name: impl Into<String>, line: Option<u32>) -> Result<u32, IrqError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(IrqError::DuplicateInterrupt(name));
        }
        let line = match line {
            Some(line) => {
                if line >= self.lines {
                    return Err(IrqError::LineOutOfRange { line, lines: self.lines });
                }
                if let Some(holder) = self.holder(line) {
                    return Err(IrqError::LineInUse { line, holder: holder.to_string() });
                }
                line
            }
            None => (0..self.lines)
                .find(|l| self.holder(*l).is_none())
                .ok_or_else(|| IrqError::NoFreeLine(name.clone()))?,
        };
        log::info!("Interrupt '{}' on line {}", name, line);
        self.entries.insert(name, line);
        Ok(line)
    }

    pub fn line(&self, name: &str) -> Option<u32> {
        self.entries.get(name).copied()
    }

    fn holder(&self, line: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, l)| **l == line)
            .map(|(name, _)| name.as_str())
    }

    /// Entries sorted by line.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        let mut entries: Vec<(&str, u32)> = self.entries.iter().map(|(n, l)| (n.as_str(), *l)).collect();
        entries.sort_by_key(|(_, l)| *l);
        entries.into_iter()
    }

    /// CPU pending vector: bit `n` set when the aggregator on line `n` asserts its IRQ.
    pub fn pending_lines(&self, managers: &[(&str, &EventManager)]) -> Result<u32, IrqError> {
        let mut pending = 0u32;
        for (name, manager) in managers {
            let line = self
                .line(name)
                .ok_or_else(|| IrqError::UnknownName(name.to_string()))?;
            if manager.combined_irq() {
                pending |= 1 << line;
            }
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irq::{EventKind, RegisterLayout};

    #[test]
    fn test_fixed_and_auto_lines() {
        let mut map = InterruptMap::new(32);
        assert_eq!(map.add("ps", Some(2)).unwrap(), 2);
        assert_eq!(map.add("timer0", None).unwrap(), 0);
        assert_eq!(map.add("uart", None).unwrap(), 1);
        assert_eq!(map.add("eth", None).unwrap(), 3);

        let order: Vec<(&str, u32)> = map.iter().collect();
        assert_eq!(order, [("timer0", 0), ("uart", 1), ("ps", 2), ("eth", 3)]);
    }

    #[test]
    fn test_conflicts() {
        let mut map = InterruptMap::new(4);
        map.add("ps", Some(2)).unwrap();
        assert_eq!(map.add("ps", None), Err(IrqError::DuplicateInterrupt("ps".into())));
        assert_eq!(
            map.add("uart", Some(2)),
            Err(IrqError::LineInUse { line: 2, holder: "ps".into() })
        );
        assert_eq!(
            map.add("uart", Some(4)),
            Err(IrqError::LineOutOfRange { line: 4, lines: 4 })
        );

        map.add("a", None).unwrap();
        map.add("b", None).unwrap();
        map.add("c", None).unwrap();
        assert_eq!(map.add("d", None), Err(IrqError::NoFreeLine("d".into())));
    }

    #[test]
    fn test_pending_lines() {
        let mut map = InterruptMap::new(32);
        map.add("ps", Some(2)).unwrap();

        let mut ps = EventManager::new("ps", RegisterLayout::new(0x800, 4)).unwrap();
        let uart = ps.declare("uart", EventKind::Level).unwrap();
        ps.set_enable(uart, true).unwrap();

        assert_eq!(map.pending_lines(&[("ps", &ps)]).unwrap(), 0);
        ps.drive(uart, true).unwrap();
        assert_eq!(map.pending_lines(&[("ps", &ps)]).unwrap(), 1 << 2);

        assert!(map.pending_lines(&[("nope", &ps)]).is_err());
    }
}
