/// Write-page size in bytes for a 24XX capacity given in kilobits. Unknown
/// capacities have no entry; the caller rejects them before touching the bus.
pub fn page_size(capacity_kbits: u32) -> Option<usize> {
	match capacity_kbits {
		2048 => Some(256),
		1024 => Some(256),
		512 => Some(128),
		256 => Some(64),
		64 => Some(32),
		32 => Some(32),
		16 => Some(16),
		8 => Some(16),
		4 => Some(16),
		2 => Some(8),
		1 => Some(8),
		0 => Some(16),
		_ => None,
	}
}

/// Highest addressable byte offset for a capacity in kilobits.
pub fn max_position(capacity_kbits: u32) -> usize {
	match capacity_kbits {
		// the sub-kilobit part holds 16 bytes
		0 => 15,
		kbits => kbits as usize * 128 - 1,
	}
}
