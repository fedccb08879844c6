//! Port range to (value, mask) decomposition.

use super::types::ClassifierError;
use sfc_types::PortMask;

/// Inclusive L4 port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    min: u16,
    max: u16,
}

impl PortRange {
    pub const FULL: PortRange = PortRange {
        min: 0,
        max: u16::MAX,
    };

    pub fn new(min: u16, max: u16) -> Result<Self, ClassifierError> {
        if min > max {
            return Err(ClassifierError::InvalidPortRange { min, max });
        }
        Ok(PortRange { min, max })
    }

    /// Interprets classifier bounds, where zero is the same as unset.
    ///
    /// - neither bound: `None` (wildcard)
    /// - only `max`: `[1, max]`
    /// - only `min`: `[min, 65535]`
    pub fn from_bounds(min: Option<u16>, max: Option<u16>) -> Result<Option<Self>, ClassifierError> {
        let min = min.filter(|&v| v != 0);
        let max = max.filter(|&v| v != 0);
        match (min, max) {
            (None, None) => Ok(None),
            (None, Some(max)) => PortRange::new(1, max).map(Some),
            (Some(min), None) => PortRange::new(min, u16::MAX).map(Some),
            (Some(min), Some(max)) => PortRange::new(min, max).map(Some),
        }
    }

    pub const fn min(&self) -> u16 {
        self.min
    }

    pub const fn max(&self) -> u16 {
        self.max
    }

    /// Splits the range into the fewest aligned blocks whose union is
    /// exactly `[min, max]`.
    pub fn masks(&self) -> Vec<PortMask> {
        let mut masks = Vec::new();
        let mut lo = u32::from(self.min);
        let hi = u32::from(self.max);

        while lo <= hi {
            // Largest block aligned at `lo`, then shrink until it fits.
            let mut size = if lo == 0 { 1u32 << 16 } else { 1u32 << lo.trailing_zeros() };
            while lo + size - 1 > hi {
                size >>= 1;
            }
            masks.push(PortMask::new(lo as u16, (!(size - 1)) as u16));
            lo += size;
        }
        masks
    }
}

/// Mask pairs for a classifier's bounds; unset yields the single wildcard.
pub fn port_masks(min: Option<u16>, max: Option<u16>) -> Result<Vec<PortMask>, ClassifierError> {
    Ok(match PortRange::from_bounds(min, max)? {
        Some(range) => range.masks(),
        None => vec![PortMask::WILDCARD],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn covered(masks: &[PortMask]) -> Vec<u16> {
        (0..=u16::MAX)
            .filter(|&p| masks.iter().any(|m| m.matches(p)))
            .collect()
    }

    #[test]
    fn test_aligned_block() {
        let range = PortRange::new(80, 83).unwrap();
        assert_eq!(range.masks(), vec![PortMask::new(80, 0xfffc)]);
    }

    #[test]
    fn test_unaligned_range() {
        let masks = PortRange::new(1000, 1999).unwrap().masks();
        assert_eq!(
            masks.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![
                "1000/0xfff8",
                "1008/0xfff0",
                "1024/0xfe00",
                "1536/0xff00",
                "1792/0xff80",
                "1920/0xffc0",
                "1984/0xfff0",
            ]
        );
        assert_eq!(covered(&masks), (1000..=1999).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_port_and_full_range() {
        assert_eq!(PortRange::new(22, 22).unwrap().masks(), vec![PortMask::exact(22)]);
        assert_eq!(PortRange::FULL.masks(), vec![PortMask::WILDCARD]);
        assert_eq!(
            PortRange::new(65535, 65535).unwrap().masks(),
            vec![PortMask::exact(65535)]
        );
    }

    #[test]
    fn test_unset_bounds() {
        assert_eq!(port_masks(None, None).unwrap(), vec![PortMask::WILDCARD]);
        assert_eq!(port_masks(Some(0), Some(0)).unwrap(), vec![PortMask::WILDCARD]);
        assert_eq!(
            PortRange::from_bounds(None, Some(1023)).unwrap(),
            Some(PortRange::new(1, 1023).unwrap())
        );
        assert_eq!(
            PortRange::from_bounds(Some(1024), None).unwrap(),
            Some(PortRange::new(1024, 65535).unwrap())
        );
        assert!(port_masks(Some(9), Some(8)).is_err());
    }

    /// Sweeps a spread of ranges and checks the blocks are disjoint and
    /// cover exactly the range.
    #[test]
    fn test_cover_is_exact() {
        let bounds: Vec<u16> = vec![
            0, 1, 2, 3, 7, 8, 15, 79, 80, 83, 84, 255, 256, 1023, 1024, 4097, 32767, 32768, 40000,
            65534, 65535,
        ];
        for &min in &bounds {
            for &max in bounds.iter().filter(|&&m| m >= min) {
                let masks = PortRange::new(min, max).unwrap().masks();
                let total: u32 = masks.iter().map(PortMask::span).sum();
                assert_eq!(total, u32::from(max) - u32::from(min) + 1, "[{min},{max}]");
                for mask in &masks {
                    let lo = mask.value();
                    let hi = u32::from(lo) + mask.span() - 1;
                    assert!(lo >= min && hi <= u32::from(max), "[{min},{max}] {mask}");
                }
                assert!(masks.len() <= 32, "[{min},{max}] took {} blocks", masks.len());
            }
        }
    }
}
