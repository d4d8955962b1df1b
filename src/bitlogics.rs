/// Intensity written for a bit set to 1
pub const LIGHT: u8 = 255;
/// Intensity written for a bit set to 0
pub const DARK: u8 = 0;
/// Boundary used when a single down-sampled sample must be read back as a bit
pub const MIDPOINT: u8 = 128;

/// Get a bit value on a byte. Position 7 is the most significant bit.
pub fn get_bit_at(input: u8, n: u8) -> bool {
    debug_assert!(n < 8, "The bit position must be between 0 and 7 inclusively");
    input & (1 << n) != 0 // 1 == true, 0 == false
}

/// Get the bit stored at `index` of a byte slice, scanning MSB-first.
///
/// Index 0 is bit 7 of byte 0, index 8 is bit 7 of byte 1 and so on.
pub fn get_bit_msb_first(bytes: &[u8], index: usize) -> bool {
    get_bit_at(bytes[index / 8], 7 - (index % 8) as u8)
}

/// Change a bit from an existing byte
pub fn mutate_byte(byte_val: &mut u8, bit_val: bool, position: u8) {
    let bi = u8::from(bit_val);
    *byte_val = *byte_val & !(1 << position) | (bi << position);
}

/// Get the intensity of a pixel for a bit
pub fn intensity_for_bit(bit: bool) -> u8 {
    if bit {
        LIGHT
    } else {
        DARK
    }
}

/// Read back a down-sampled intensity. Does not need to be perfect white and black,
/// the value is chosen depending if it is closer to 0 or 255.
pub fn bit_from_intensity(intensity: u8) -> bool {
    intensity >= MIDPOINT
}

/// Luma of a color pixel using the BT.601 integer weights
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let weighted = 299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b);
    (weighted / 1000) as u8
}
