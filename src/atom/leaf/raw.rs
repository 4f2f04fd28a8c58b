//! Type codes of atoms whose content is kept as raw bytes and written back verbatim

pub const IODS: &[u8; 4] = b"iods";
pub const ELST: &[u8; 4] = b"elst";
pub const VMHD: &[u8; 4] = b"vmhd";
pub const SMHD: &[u8; 4] = b"smhd";
pub const HMHD: &[u8; 4] = b"hmhd";
pub const NMHD: &[u8; 4] = b"nmhd";
pub const URL: &[u8; 4] = b"url ";
pub const URN: &[u8; 4] = b"urn ";
pub const STTS: &[u8; 4] = b"stts";
pub const CTTS: &[u8; 4] = b"ctts";
pub const STSC: &[u8; 4] = b"stsc";
pub const STSZ: &[u8; 4] = b"stsz";
pub const STZ2: &[u8; 4] = b"stz2";
pub const STSS: &[u8; 4] = b"stss";
pub const SGPD: &[u8; 4] = b"sgpd";
pub const SBGP: &[u8; 4] = b"sbgp";
