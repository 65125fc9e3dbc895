use core::fmt;

const CACHE_INFO_CPUID_LEAF: u32 = 0x4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CacheType {
    Data = 1,
    Instruction = 2,
    Unified = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    pub cache_type: CacheType,
    pub level: u8,
    pub fully_assoc: bool,
    pub cache_line_size: u16,
    pub physical_line_partition: u16,
    pub associativity: u16,
    pub sets: u32,
    pub inclusive: bool,
    pub complex_cache_indexing: bool,
}

impl CacheInfo {
    pub fn from_registers(eax: u32, ebx: u32, ecx: u32, edx: u32) -> Option<CacheInfo> {
        let cache_type = match eax & 0x1f {
            1 => CacheType::Data,
            2 => CacheType::Instruction,
            3 => CacheType::Unified,
            _ => {
                return None;
            }
        };
        Some(CacheInfo {
            cache_type,
            level: (eax >> 5 & 0x7) as u8,
            fully_assoc: (eax >> 9 & 0x1) != 0,
            cache_line_size: (ebx & 0xfff) as u16 + 1,
            physical_line_partition: (ebx >> 12 & 0x3ff) as u16 + 1,
            associativity: (ebx >> 22 & 0x3ff) as u16 + 1,
            sets: ecx + 1,
            inclusive: (edx & 0x2) != 0,
            complex_cache_indexing: (edx & 0x4) != 0,
        })
    }

    pub fn size(&self) -> usize {
        self.associativity as usize
            * self.physical_line_partition as usize
            * self.cache_line_size as usize
            * self.sets as usize
    }

    /// Lowest address bit that is not used to select the line or the set.
    pub fn first_tag_bit(&self) -> u32 {
        (self.cache_line_size as usize * self.sets as usize)
            .next_power_of_two()
            .trailing_zeros()
    }

    pub fn holds_data(&self) -> bool {
        self.cache_type != CacheType::Instruction
    }
}

impl fmt::Display for CacheInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.cache_type {
            CacheType::Data => "d",
            CacheType::Instruction => "i",
            CacheType::Unified => "",
        };
        write!(
            f,
            "L{}{}: {} KiB, {}-way, {} B lines, {} sets",
            self.level,
            kind,
            self.size() >> 10,
            self.associativity,
            self.cache_line_size,
            self.sets
        )
    }
}

#[cfg(target_arch = "x86_64")]
pub fn get_cache_info() -> Vec<CacheInfo> {
    use core::arch::x86_64 as arch_x86;

    let mut ret = Vec::new();
    let mut i = 0;
    loop {
        let r = unsafe { arch_x86::__cpuid_count(CACHE_INFO_CPUID_LEAF, i) };
        match CacheInfo::from_registers(r.eax, r.ebx, r.ecx, r.edx) {
            Some(cache_info) => ret.push(cache_info),
            None => break,
        }
        i += 1;
    }
    ret
}

#[cfg(not(target_arch = "x86_64"))]
pub fn get_cache_info() -> Vec<CacheInfo> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::{CacheInfo, CacheType};

    #[test]
    fn decode_l1d_48k_12_way() {
        // L1d: level 1 data, 64 B lines, 12 ways, 64 sets
        let eax = 1 | (1 << 5) | (1 << 8);
        let ebx = 63 | (11 << 22);
        let info = CacheInfo::from_registers(eax, ebx, 63, 0).unwrap();
        assert_eq!(info.cache_type, CacheType::Data);
        assert_eq!(info.level, 1);
        assert_eq!(info.cache_line_size, 64);
        assert_eq!(info.associativity, 12);
        assert_eq!(info.sets, 64);
        assert_eq!(info.size(), 48 << 10);
        assert_eq!(info.first_tag_bit(), 12);
        assert_eq!(info.to_string(), "L1d: 48 KiB, 12-way, 64 B lines, 64 sets");
    }

    #[test]
    fn null_leaf_ends_enumeration() {
        assert_eq!(CacheInfo::from_registers(0, 0, 0, 0), None);
    }

    #[test]
    fn enumeration_does_not_panic() {
        for info in super::get_cache_info() {
            assert!(info.level >= 1);
        }
    }
}
