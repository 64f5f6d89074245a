/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use crate::config::VirtualAddressWidth;
use crate::modules::frame_pool::FrameId;

#[inline]
pub(crate) const fn div_ceil(num: u64, div: u64) -> u64 {
    (num + div - 1) / div
}

/// Number of index bits needed to address `count` distinct values,
/// i.e. `ceil(log2(count))`. `count == 0` and `count == 1` both yield 0.
#[inline]
pub(crate) const fn ceil_log2(count: u64) -> u32 {
    if count <= 1 {
        0
    } else {
        u64::BITS - (count - 1).leading_zeros()
    }
}

/// Parses a human byte size like `"32 GB"`, `"512 MB"` or `"1024"` (plain
/// bytes). Unit prefixes are the usual power-of-two sizes.
pub(crate) fn parse_byte_size(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let value: u64 = digits.trim().parse().ok()?;

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "KB" | "KIB" => 1024,
        "MB" | "MIB" => 1024 * 1024,
        "GB" | "GIB" => 1024 * 1024 * 1024,
        "TB" | "TIB" => 1024u64.pow(4),
        _ => return None,
    };
    value.checked_mul(multiplier)
}

/// Renders a virtual address as `0x` followed by the zero-padded hex
/// digits of the configured address width (4/8/16 digits).
pub(crate) fn format_virtual_address(address: u64, width: VirtualAddressWidth) -> String {
    format!(
        "0x{:0digits$x}",
        address,
        digits = width.hex_digits()
    )
}

/// Renders a physical frame using the export convention: the leading
/// character is `0` for a RAM frame and `1` for a swap frame, followed by
/// `x` and the lowercase hex frame number.
pub(crate) fn format_physical_frame(frame: FrameId, in_ram: bool) -> String {
    if in_ram {
        format!("0x{:x}", frame)
    } else {
        format!("1x{:x}", frame)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_div_ceil() {
        assert_eq!(div_ceil(0, 4), 0);
        assert_eq!(div_ceil(1, 4), 1);
        assert_eq!(div_ceil(4, 4), 1);
        assert_eq!(div_ceil(5, 4), 2);
    }

    #[test]
    fn test_ceil_log2() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(1024), 10);
        assert_eq!(ceil_log2(1025), 11);
    }

    #[test]
    fn test_parse_byte_size() {
        assert_eq!(parse_byte_size("32 GB"), Some(32 * 1024 * 1024 * 1024));
        assert_eq!(parse_byte_size("4KB"), Some(4096));
        assert_eq!(parse_byte_size("512"), Some(512));
        assert_eq!(parse_byte_size("twelve"), None);
    }

    #[test]
    fn test_format_physical_frame() {
        assert_eq!(format_physical_frame(0x2f, true), "0x2f");
        assert_eq!(format_physical_frame(0x2f, false), "1x2f");
    }

    #[test]
    fn test_format_virtual_address() {
        assert_eq!(
            format_virtual_address(0x1000, VirtualAddressWidth::Bits16),
            "0x1000"
        );
        assert_eq!(
            format_virtual_address(0x1000, VirtualAddressWidth::Bits32),
            "0x00001000"
        );
    }
}
