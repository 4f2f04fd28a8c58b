use crate::atom::util::{Fixed16x16, Fixed8x8};

pub fn be_u32(value: u32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn be_u32_or_u64(version: u8, value: u64) -> Option<Vec<u8>> {
    match version {
        0 => u32::try_from(value).ok().map(be_u32),
        _ => Some(value.to_be_bytes().to_vec()),
    }
}

pub fn fixed_point_16x16(val: Fixed16x16) -> Vec<u8> {
    val.0.to_be_bytes().to_vec()
}

pub fn fixed_point_8x8(val: Fixed8x8) -> Vec<u8> {
    val.0.to_be_bytes().to_vec()
}

pub fn matrix(matrix: [i32; 9]) -> Vec<u8> {
    matrix.into_iter().flat_map(i32::to_be_bytes).collect()
}

/// Serializes a nested atom from its type and body, using a 32-bit size field
pub fn nested_atom(atom_type: &[u8; 4], body: &[u8]) -> Option<Vec<u8>> {
    let size = u32::try_from(body.len() + 8).ok()?;
    let mut data = Vec::with_capacity(body.len() + 8);
    data.extend(size.to_be_bytes());
    data.extend(atom_type);
    data.extend(body);
    Some(data)
}
