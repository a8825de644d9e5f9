//! Constants of the FITS-style container format

/// Size of one header or data block in bytes
pub const BLOCK_SIZE: usize = 2880;

/// Size of one header card in bytes
pub const CARD_SIZE: usize = 80;

/// Number of cards per header block
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// Width of the keyword field
pub const KEYWORD_WIDTH: usize = 8;

/// Offset of the BZERO used for unsigned 16-bit samples
pub const U16_BZERO: i64 = 32_768;

/// Offset of the BZERO used for unsigned 32-bit samples
pub const U32_BZERO: i64 = 2_147_483_648;

/// Header keywords
pub mod keywords {
    pub const SIMPLE: &str = "SIMPLE";
    pub const XTENSION: &str = "XTENSION";
    pub const BITPIX: &str = "BITPIX";
    pub const NAXIS: &str = "NAXIS";
    pub const NAXIS1: &str = "NAXIS1";
    pub const NAXIS2: &str = "NAXIS2";
    pub const EXTEND: &str = "EXTEND";
    pub const PCOUNT: &str = "PCOUNT";
    pub const GCOUNT: &str = "GCOUNT";
    pub const BZERO: &str = "BZERO";
    pub const BSCALE: &str = "BSCALE";
    pub const EXTNAME: &str = "EXTNAME";
    pub const TFIELDS: &str = "TFIELDS";
    pub const FILTER: &str = "FILTER";
    pub const END: &str = "END";
    pub const COMMENT: &str = "COMMENT";
    pub const HISTORY: &str = "HISTORY";
    pub const HIERARCH: &str = "HIERARCH";
}

/// Extension type names
pub mod xtension {
    pub const IMAGE: &str = "IMAGE";
    pub const BINTABLE: &str = "BINTABLE";
}

/// Whether a keyword describes the container layout rather than the data
pub fn is_structural_keyword(key: &str) -> bool {
    use keywords::*;

    if matches!(key, SIMPLE | XTENSION | BITPIX | NAXIS | EXTEND | PCOUNT | GCOUNT
        | BZERO | BSCALE | EXTNAME | TFIELDS | END | COMMENT | HISTORY | "") {
        return true;
    }
    if let Some(rest) = key.strip_prefix(NAXIS) {
        return rest.chars().all(|c| c.is_ascii_digit());
    }
    ["TTYPE", "TFORM", "TUNIT", "TDIM", "TNULL", "TSCAL", "TZERO"].iter()
        .any(|p| key.strip_prefix(p)
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())))
}
