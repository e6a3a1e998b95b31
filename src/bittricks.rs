// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
bit packing.

Request ids travel through host event mechanisms that only carry one integer.
*/

pub fn u64_to_u32s(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, (packed & 0xFFFF_FFFF) as u32)
}

pub fn u32s_to_u64(high: u32, low: u32) -> u64 {
    ((high as u64) << 32) | (low as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_are_preserved() {
        let packed = u32s_to_u64(0xDEAD_BEEF, 7);
        assert_eq!(packed, 0xDEAD_BEEF_0000_0007);
        assert_eq!(u64_to_u32s(packed), (0xDEAD_BEEF, 7));
        assert_eq!(u64_to_u32s(u64::MAX), (u32::MAX, u32::MAX));
    }
}
