//! Layer III Huffman 码表数据.
//!
//! 34 张表的 (码字, 码长) 字面量, 行主序排列 (索引 = x * ylen + y).
//! 表 0/4/14 是退化表, 没有码流数据; 表 16..=23 共享同一棵树,
//! 仅逃逸码位宽不同; 表 24..=31 同理; 表 32/33 是 count1 四元组表.

/// 单张码表的构造参数
pub(crate) struct TableSpec {
    /// x 维最大索引 + 1
    pub xlen: u32,
    /// y 维最大索引 + 1
    pub ylen: u32,
    /// 逃逸码位宽 (0 表示无逃逸码)
    pub linbits: u32,
    /// 是否为 count1 四元组表
    pub quad: bool,
    /// (码字, 码长) 数据; `None` 表示退化表
    pub data: Option<(&'static [u16], &'static [u8])>,
}

/// 全部 34 张表的构造参数
pub(crate) static TABLE_SPECS: [TableSpec; 34] = [
    TableSpec { xlen: 0, ylen: 0, linbits: 0, quad: false, data: None },
    TableSpec { xlen: 2, ylen: 2, linbits: 0, quad: false, data: Some((&CODES_1, &BITS_1)) },
    TableSpec { xlen: 3, ylen: 3, linbits: 0, quad: false, data: Some((&CODES_2, &BITS_2)) },
    TableSpec { xlen: 3, ylen: 3, linbits: 0, quad: false, data: Some((&CODES_3, &BITS_3)) },
    TableSpec { xlen: 0, ylen: 0, linbits: 0, quad: false, data: None },
    TableSpec { xlen: 4, ylen: 4, linbits: 0, quad: false, data: Some((&CODES_5, &BITS_5)) },
    TableSpec { xlen: 4, ylen: 4, linbits: 0, quad: false, data: Some((&CODES_6, &BITS_6)) },
    TableSpec { xlen: 6, ylen: 6, linbits: 0, quad: false, data: Some((&CODES_7, &BITS_7)) },
    TableSpec { xlen: 6, ylen: 6, linbits: 0, quad: false, data: Some((&CODES_8, &BITS_8)) },
    TableSpec { xlen: 6, ylen: 6, linbits: 0, quad: false, data: Some((&CODES_9, &BITS_9)) },
    TableSpec { xlen: 8, ylen: 8, linbits: 0, quad: false, data: Some((&CODES_10, &BITS_10)) },
    TableSpec { xlen: 8, ylen: 8, linbits: 0, quad: false, data: Some((&CODES_11, &BITS_11)) },
    TableSpec { xlen: 8, ylen: 8, linbits: 0, quad: false, data: Some((&CODES_12, &BITS_12)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 0, quad: false, data: Some((&CODES_13, &BITS_13)) },
    TableSpec { xlen: 0, ylen: 0, linbits: 0, quad: false, data: None },
    TableSpec { xlen: 16, ylen: 16, linbits: 0, quad: false, data: Some((&CODES_15, &BITS_15)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 1, quad: false, data: Some((&CODES_16, &BITS_16)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 2, quad: false, data: Some((&CODES_16, &BITS_16)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 3, quad: false, data: Some((&CODES_16, &BITS_16)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 4, quad: false, data: Some((&CODES_16, &BITS_16)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 6, quad: false, data: Some((&CODES_16, &BITS_16)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 8, quad: false, data: Some((&CODES_16, &BITS_16)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 10, quad: false, data: Some((&CODES_16, &BITS_16)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 13, quad: false, data: Some((&CODES_16, &BITS_16)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 4, quad: false, data: Some((&CODES_24, &BITS_24)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 5, quad: false, data: Some((&CODES_24, &BITS_24)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 6, quad: false, data: Some((&CODES_24, &BITS_24)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 7, quad: false, data: Some((&CODES_24, &BITS_24)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 8, quad: false, data: Some((&CODES_24, &BITS_24)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 9, quad: false, data: Some((&CODES_24, &BITS_24)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 11, quad: false, data: Some((&CODES_24, &BITS_24)) },
    TableSpec { xlen: 16, ylen: 16, linbits: 13, quad: false, data: Some((&CODES_24, &BITS_24)) },
    TableSpec { xlen: 1, ylen: 16, linbits: 0, quad: true, data: Some((&CODES_32, &BITS_32)) },
    TableSpec { xlen: 1, ylen: 16, linbits: 0, quad: true, data: Some((&CODES_33, &BITS_33)) },
];

pub(crate) static CODES_1: [u16; 4] = [
    0x0001, 0x0001, 0x0001, 0x0000,
];
pub(crate) static BITS_1: [u8; 4] = [
    1, 3, 2, 3,
];

pub(crate) static CODES_2: [u16; 9] = [
    0x0001, 0x0002, 0x0001, 0x0003, 0x0001, 0x0001, 0x0003, 0x0002,
    0x0000,
];
pub(crate) static BITS_2: [u8; 9] = [
    1, 3, 6, 3, 3, 5, 5, 5,
    6,
];

pub(crate) static CODES_3: [u16; 9] = [
    0x0003, 0x0002, 0x0001, 0x0001, 0x0001, 0x0001, 0x0003, 0x0002,
    0x0000,
];
pub(crate) static BITS_3: [u8; 9] = [
    2, 2, 6, 3, 2, 5, 5, 5,
    6,
];

pub(crate) static CODES_5: [u16; 16] = [
    0x0001, 0x0002, 0x0006, 0x0005, 0x0003, 0x0001, 0x0004, 0x0004,
    0x0007, 0x0005, 0x0007, 0x0001, 0x0006, 0x0001, 0x0001, 0x0000,
];
pub(crate) static BITS_5: [u8; 16] = [
    1, 3, 6, 7, 3, 3, 6, 7,
    6, 6, 7, 8, 7, 6, 7, 8,
];

pub(crate) static CODES_6: [u16; 16] = [
    0x0007, 0x0003, 0x0005, 0x0001, 0x0006, 0x0002, 0x0003, 0x0002,
    0x0005, 0x0004, 0x0004, 0x0001, 0x0003, 0x0003, 0x0002, 0x0000,
];
pub(crate) static BITS_6: [u8; 16] = [
    3, 3, 5, 7, 3, 2, 4, 5,
    4, 4, 5, 6, 6, 5, 6, 7,
];

pub(crate) static CODES_7: [u16; 36] = [
    0x0001, 0x0002, 0x000a, 0x0013, 0x0010, 0x000a, 0x0003, 0x0003,
    0x0007, 0x000a, 0x0005, 0x0003, 0x000b, 0x0004, 0x000d, 0x0011,
    0x0008, 0x0004, 0x000c, 0x000b, 0x0012, 0x000f, 0x000b, 0x0002,
    0x0007, 0x0006, 0x0009, 0x000e, 0x0003, 0x0001, 0x0006, 0x0004,
    0x0005, 0x0003, 0x0002, 0x0000,
];
pub(crate) static BITS_7: [u8; 36] = [
    1, 3, 6, 8, 8, 9, 3, 4,
    6, 7, 7, 8, 6, 5, 7, 8,
    8, 9, 7, 7, 8, 9, 9, 9,
    7, 7, 8, 9, 9, 10, 8, 8,
    9, 10, 10, 10,
];

pub(crate) static CODES_8: [u16; 36] = [
    0x0003, 0x0004, 0x0006, 0x0012, 0x000c, 0x0005, 0x0005, 0x0001,
    0x0002, 0x0010, 0x0009, 0x0003, 0x0007, 0x0003, 0x0005, 0x000e,
    0x0007, 0x0003, 0x0013, 0x0011, 0x000f, 0x000d, 0x000a, 0x0004,
    0x000d, 0x0005, 0x0008, 0x000b, 0x0005, 0x0001, 0x000c, 0x0004,
    0x0004, 0x0001, 0x0001, 0x0000,
];
pub(crate) static BITS_8: [u8; 36] = [
    2, 3, 6, 8, 8, 9, 3, 2,
    4, 8, 8, 8, 6, 4, 6, 8,
    8, 9, 8, 8, 8, 9, 9, 10,
    8, 7, 8, 9, 10, 10, 9, 8,
    9, 9, 11, 11,
];

pub(crate) static CODES_9: [u16; 36] = [
    0x0007, 0x0005, 0x0009, 0x000e, 0x000f, 0x0007, 0x0006, 0x0004,
    0x0005, 0x0005, 0x0006, 0x0007, 0x0007, 0x0006, 0x0008, 0x0008,
    0x0008, 0x0005, 0x000f, 0x0006, 0x0009, 0x000a, 0x0005, 0x0001,
    0x000b, 0x0007, 0x0009, 0x0006, 0x0004, 0x0001, 0x000e, 0x0004,
    0x0006, 0x0002, 0x0006, 0x0000,
];
pub(crate) static BITS_9: [u8; 36] = [
    3, 3, 5, 6, 8, 9, 3, 3,
    4, 5, 6, 8, 4, 4, 5, 6,
    7, 8, 6, 5, 6, 7, 7, 8,
    7, 6, 7, 7, 8, 9, 8, 7,
    8, 8, 9, 9,
];

pub(crate) static CODES_10: [u16; 64] = [
    0x0001, 0x0002, 0x000a, 0x0017, 0x0023, 0x001e, 0x000c, 0x0011,
    0x0003, 0x0003, 0x0008, 0x000c, 0x0012, 0x0015, 0x000c, 0x0007,
    0x000b, 0x0009, 0x000f, 0x0015, 0x0020, 0x0028, 0x0013, 0x0006,
    0x000e, 0x000d, 0x0016, 0x0022, 0x002e, 0x0017, 0x0012, 0x0007,
    0x0014, 0x0013, 0x0021, 0x002f, 0x001b, 0x0016, 0x0009, 0x0003,
    0x001f, 0x0016, 0x0029, 0x001a, 0x0015, 0x0014, 0x0005, 0x0003,
    0x000e, 0x000d, 0x000a, 0x000b, 0x0010, 0x0006, 0x0005, 0x0001,
    0x0009, 0x0008, 0x0007, 0x0008, 0x0004, 0x0004, 0x0002, 0x0000,
];
pub(crate) static BITS_10: [u8; 64] = [
    1, 3, 6, 8, 9, 9, 9, 10,
    3, 4, 6, 7, 8, 9, 8, 8,
    6, 6, 7, 8, 9, 10, 9, 9,
    7, 7, 8, 9, 10, 10, 9, 10,
    8, 8, 9, 10, 10, 10, 10, 10,
    9, 9, 10, 10, 11, 11, 10, 11,
    8, 8, 9, 10, 10, 10, 11, 11,
    9, 8, 9, 10, 10, 11, 11, 11,
];

pub(crate) static CODES_11: [u16; 64] = [
    0x0003, 0x0004, 0x000a, 0x0018, 0x0022, 0x0021, 0x0015, 0x000f,
    0x0005, 0x0003, 0x0004, 0x000a, 0x0020, 0x0011, 0x000b, 0x000a,
    0x000b, 0x0007, 0x000d, 0x0012, 0x001e, 0x001f, 0x0014, 0x0005,
    0x0019, 0x000b, 0x0013, 0x003b, 0x001b, 0x0012, 0x000c, 0x0005,
    0x0023, 0x0021, 0x001f, 0x003a, 0x001e, 0x0010, 0x0007, 0x0005,
    0x001c, 0x001a, 0x0020, 0x0013, 0x0011, 0x000f, 0x0008, 0x000e,
    0x000e, 0x000c, 0x0009, 0x000d, 0x000e, 0x0009, 0x0004, 0x0001,
    0x000b, 0x0004, 0x0006, 0x0006, 0x0006, 0x0003, 0x0002, 0x0000,
];
pub(crate) static BITS_11: [u8; 64] = [
    2, 3, 5, 7, 8, 9, 8, 9,
    3, 3, 4, 6, 8, 8, 7, 8,
    5, 5, 6, 7, 8, 9, 8, 8,
    7, 6, 7, 9, 8, 10, 8, 9,
    8, 8, 8, 9, 9, 10, 9, 10,
    8, 8, 9, 10, 10, 11, 10, 11,
    8, 7, 7, 8, 9, 10, 10, 10,
    8, 7, 8, 9, 10, 10, 10, 10,
];

pub(crate) static CODES_12: [u16; 64] = [
    0x0009, 0x0006, 0x0010, 0x0021, 0x0029, 0x0027, 0x0026, 0x001a,
    0x0007, 0x0005, 0x0006, 0x0009, 0x0017, 0x0010, 0x001a, 0x000b,
    0x0011, 0x0007, 0x000b, 0x000e, 0x0015, 0x001e, 0x000a, 0x0007,
    0x0011, 0x000a, 0x000f, 0x000c, 0x0012, 0x001c, 0x000e, 0x0005,
    0x0020, 0x000d, 0x0016, 0x0013, 0x0012, 0x0010, 0x0009, 0x0005,
    0x0028, 0x0011, 0x001f, 0x001d, 0x0011, 0x000d, 0x0004, 0x0002,
    0x001b, 0x000c, 0x000b, 0x000f, 0x000a, 0x0007, 0x0004, 0x0001,
    0x001b, 0x000c, 0x0008, 0x000c, 0x0006, 0x0003, 0x0001, 0x0000,
];
pub(crate) static BITS_12: [u8; 64] = [
    4, 3, 5, 7, 8, 9, 9, 9,
    3, 3, 4, 5, 7, 7, 8, 8,
    5, 4, 5, 6, 7, 8, 7, 8,
    6, 5, 6, 6, 7, 8, 8, 8,
    7, 6, 7, 7, 8, 8, 8, 9,
    8, 7, 8, 8, 8, 9, 8, 9,
    8, 7, 7, 8, 8, 9, 9, 9,
    9, 8, 8, 9, 9, 9, 10, 10,
];

pub(crate) static CODES_13: [u16; 256] = [
    0x0001, 0x0005, 0x000e, 0x0015, 0x0022, 0x0033, 0x002e, 0x0047,
    0x002a, 0x0034, 0x0044, 0x0034, 0x0043, 0x002c, 0x002b, 0x0013,
    0x0003, 0x0004, 0x000c, 0x0013, 0x001f, 0x001a, 0x002c, 0x0021,
    0x001f, 0x0018, 0x0020, 0x0018, 0x001f, 0x0023, 0x0016, 0x000e,
    0x000f, 0x000d, 0x0017, 0x0024, 0x003b, 0x0031, 0x004d, 0x0041,
    0x001d, 0x0028, 0x001e, 0x0028, 0x001b, 0x0021, 0x002a, 0x0010,
    0x0016, 0x0014, 0x0025, 0x003d, 0x0038, 0x004f, 0x0049, 0x0040,
    0x002b, 0x004c, 0x0038, 0x0025, 0x001a, 0x001f, 0x0019, 0x000e,
    0x0023, 0x0010, 0x003c, 0x0039, 0x0061, 0x004b, 0x0072, 0x005b,
    0x0036, 0x0049, 0x0037, 0x0029, 0x0030, 0x0035, 0x0017, 0x0018,
    0x003a, 0x001b, 0x0032, 0x0060, 0x004c, 0x0046, 0x005d, 0x0054,
    0x004d, 0x003a, 0x004f, 0x001d, 0x004a, 0x0031, 0x0029, 0x0011,
    0x002f, 0x002d, 0x004e, 0x004a, 0x0073, 0x005e, 0x005a, 0x004f,
    0x0045, 0x0053, 0x0047, 0x0032, 0x003b, 0x0026, 0x0024, 0x000f,
    0x0048, 0x0022, 0x0038, 0x005f, 0x005c, 0x0055, 0x005b, 0x005a,
    0x0056, 0x0049, 0x004d, 0x0041, 0x0033, 0x002c, 0x002b, 0x002a,
    0x002b, 0x0014, 0x001e, 0x002c, 0x0037, 0x004e, 0x0048, 0x0057,
    0x004e, 0x003d, 0x002e, 0x0036, 0x0025, 0x001e, 0x0014, 0x0010,
    0x0035, 0x0019, 0x0029, 0x0025, 0x002c, 0x003b, 0x0036, 0x0051,
    0x0042, 0x004c, 0x0039, 0x0036, 0x0025, 0x0012, 0x0027, 0x000b,
    0x0023, 0x0021, 0x001f, 0x0039, 0x002a, 0x0052, 0x0048, 0x0050,
    0x002f, 0x003a, 0x0037, 0x0015, 0x0016, 0x001a, 0x0026, 0x0016,
    0x0035, 0x0019, 0x0017, 0x0026, 0x0046, 0x003c, 0x0033, 0x0024,
    0x002e, 0x001a, 0x0022, 0x0017, 0x001b, 0x000e, 0x0009, 0x0007,
    0x0022, 0x0020, 0x001c, 0x0027, 0x0031, 0x004b, 0x001e, 0x0034,
    0x0030, 0x0028, 0x0034, 0x001a, 0x0012, 0x0011, 0x0009, 0x0005,
    0x002d, 0x0015, 0x0022, 0x0040, 0x0038, 0x0032, 0x0031, 0x002d,
    0x001f, 0x0013, 0x000c, 0x000f, 0x000a, 0x0007, 0x0006, 0x0003,
    0x0030, 0x002f, 0x0014, 0x0027, 0x0024, 0x0023, 0x0035, 0x0015,
    0x0010, 0x0017, 0x000e, 0x000a, 0x0006, 0x0001, 0x0004, 0x0002,
    0x0010, 0x000f, 0x0011, 0x001b, 0x0019, 0x0014, 0x0017, 0x0037,
    0x0011, 0x000c, 0x0010, 0x0008, 0x0001, 0x0000, 0x0016, 0x001b,
];
pub(crate) static BITS_13: [u8; 256] = [
    1, 4, 6, 7, 8, 9, 9, 10,
    9, 10, 11, 11, 12, 12, 13, 13,
    3, 4, 6, 7, 8, 8, 9, 9,
    9, 9, 10, 10, 11, 12, 12, 12,
    6, 6, 7, 8, 9, 9, 10, 10,
    9, 10, 10, 11, 11, 12, 13, 13,
    7, 7, 8, 9, 9, 10, 10, 10,
    10, 11, 11, 11, 11, 12, 13, 13,
    8, 7, 9, 9, 10, 10, 11, 11,
    10, 11, 11, 12, 12, 13, 13, 14,
    9, 8, 9, 10, 10, 10, 11, 11,
    11, 11, 12, 11, 13, 13, 14, 14,
    9, 9, 10, 10, 11, 11, 11, 11,
    11, 12, 12, 12, 13, 13, 14, 14,
    10, 9, 10, 11, 11, 11, 12, 12,
    12, 12, 13, 13, 13, 14, 16, 16,
    9, 8, 9, 10, 10, 11, 11, 12,
    12, 12, 12, 13, 13, 14, 15, 15,
    10, 9, 10, 10, 11, 11, 11, 13,
    12, 13, 13, 14, 14, 14, 16, 15,
    10, 10, 10, 11, 11, 12, 12, 13,
    13, 13, 13, 13, 14, 16, 16, 15,
    11, 10, 10, 11, 12, 12, 12, 12,
    13, 13, 13, 14, 15, 14, 15, 16,
    11, 11, 11, 12, 12, 13, 12, 13,
    14, 14, 15, 15, 15, 16, 16, 16,
    12, 11, 12, 13, 13, 13, 14, 14,
    14, 14, 14, 15, 16, 15, 16, 16,
    13, 12, 12, 13, 13, 13, 15, 14,
    14, 17, 15, 15, 15, 16, 16, 16,
    12, 12, 13, 14, 14, 14, 15, 14,
    15, 15, 16, 16, 17, 17, 17, 16,
];

pub(crate) static CODES_15: [u16; 256] = [
    0x0007, 0x000c, 0x0012, 0x0035, 0x002f, 0x004c, 0x007c, 0x006c,
    0x0059, 0x007b, 0x006c, 0x0077, 0x006b, 0x0051, 0x007a, 0x003f,
    0x000d, 0x0005, 0x0010, 0x001b, 0x002e, 0x0024, 0x003d, 0x0033,
    0x002a, 0x0046, 0x0034, 0x0053, 0x0041, 0x0029, 0x003b, 0x0024,
    0x0013, 0x0011, 0x000f, 0x0018, 0x0029, 0x0022, 0x003b, 0x0030,
    0x0028, 0x0040, 0x0032, 0x004e, 0x003e, 0x0050, 0x0038, 0x0021,
    0x001d, 0x001c, 0x0019, 0x002b, 0x0027, 0x003f, 0x0037, 0x005d,
    0x004c, 0x003b, 0x005d, 0x0048, 0x0036, 0x004b, 0x0032, 0x001d,
    0x0034, 0x0016, 0x002a, 0x0028, 0x0043, 0x0039, 0x005f, 0x004f,
    0x0048, 0x0039, 0x0059, 0x0045, 0x0031, 0x0042, 0x002e, 0x001b,
    0x004d, 0x0025, 0x0023, 0x0042, 0x003a, 0x0034, 0x005b, 0x004a,
    0x003e, 0x0030, 0x004f, 0x003f, 0x005a, 0x003e, 0x0028, 0x0026,
    0x007d, 0x0020, 0x003c, 0x0038, 0x0032, 0x005c, 0x004e, 0x0041,
    0x0037, 0x0057, 0x0047, 0x0033, 0x0049, 0x0033, 0x0046, 0x001e,
    0x006d, 0x0035, 0x0031, 0x005e, 0x0058, 0x004b, 0x0042, 0x007a,
    0x005b, 0x0049, 0x0038, 0x002a, 0x0040, 0x002c, 0x0015, 0x0019,
    0x005a, 0x002b, 0x0029, 0x004d, 0x0049, 0x003f, 0x0038, 0x005c,
    0x004d, 0x0042, 0x002f, 0x0043, 0x0030, 0x0035, 0x0024, 0x0014,
    0x0047, 0x0022, 0x0043, 0x003c, 0x003a, 0x0031, 0x0058, 0x004c,
    0x0043, 0x006a, 0x0047, 0x0036, 0x0026, 0x0027, 0x0017, 0x000f,
    0x006d, 0x0035, 0x0033, 0x002f, 0x005a, 0x0052, 0x003a, 0x0039,
    0x0030, 0x0048, 0x0039, 0x0029, 0x0017, 0x001b, 0x003e, 0x0009,
    0x0056, 0x002a, 0x0028, 0x0025, 0x0046, 0x0040, 0x0034, 0x002b,
    0x0046, 0x0037, 0x002a, 0x0019, 0x001d, 0x0012, 0x000b, 0x000b,
    0x0076, 0x0044, 0x001e, 0x0037, 0x0032, 0x002e, 0x004a, 0x0041,
    0x0031, 0x0027, 0x0018, 0x0010, 0x0016, 0x000d, 0x000e, 0x0007,
    0x005b, 0x002c, 0x0027, 0x0026, 0x0022, 0x003f, 0x0034, 0x002d,
    0x001f, 0x0034, 0x001c, 0x0013, 0x000e, 0x0008, 0x0009, 0x0003,
    0x007b, 0x003c, 0x003a, 0x0035, 0x002f, 0x002b, 0x0020, 0x0016,
    0x0025, 0x0018, 0x0011, 0x000c, 0x000f, 0x000a, 0x0002, 0x0001,
    0x0047, 0x0025, 0x0022, 0x001e, 0x001c, 0x0014, 0x0011, 0x001a,
    0x0015, 0x0010, 0x000a, 0x0006, 0x0008, 0x0006, 0x0002, 0x0000,
];
pub(crate) static BITS_15: [u8; 256] = [
    3, 4, 5, 7, 7, 8, 9, 9,
    9, 10, 10, 11, 11, 11, 12, 13,
    4, 3, 5, 6, 7, 7, 8, 8,
    8, 9, 9, 10, 10, 10, 11, 11,
    5, 5, 5, 6, 7, 7, 8, 8,
    8, 9, 9, 10, 10, 11, 11, 11,
    6, 6, 6, 7, 7, 8, 8, 9,
    9, 9, 10, 10, 10, 11, 11, 11,
    7, 6, 7, 7, 8, 8, 9, 9,
    9, 9, 10, 10, 10, 11, 11, 11,
    8, 7, 7, 8, 8, 8, 9, 9,
    9, 9, 10, 10, 11, 11, 11, 12,
    9, 7, 8, 8, 8, 9, 9, 9,
    9, 10, 10, 10, 11, 11, 12, 12,
    9, 8, 8, 9, 9, 9, 9, 10,
    10, 10, 10, 10, 11, 11, 11, 12,
    9, 8, 8, 9, 9, 9, 9, 10,
    10, 10, 10, 11, 11, 12, 12, 12,
    9, 8, 9, 9, 9, 9, 10, 10,
    10, 11, 11, 11, 11, 12, 12, 12,
    10, 9, 9, 9, 10, 10, 10, 10,
    10, 11, 11, 11, 11, 12, 13, 12,
    10, 9, 9, 9, 10, 10, 10, 10,
    11, 11, 11, 11, 12, 12, 12, 13,
    11, 10, 9, 10, 10, 10, 11, 11,
    11, 11, 11, 11, 12, 12, 13, 13,
    11, 10, 10, 10, 10, 11, 11, 11,
    11, 12, 12, 12, 12, 12, 13, 13,
    12, 11, 11, 11, 11, 11, 11, 11,
    12, 12, 12, 12, 13, 13, 12, 13,
    12, 11, 11, 11, 11, 11, 11, 12,
    12, 12, 12, 12, 13, 13, 13, 13,
];

pub(crate) static CODES_16: [u16; 256] = [
    0x0001, 0x0005, 0x000e, 0x002c, 0x004a, 0x003f, 0x006e, 0x005d,
    0x00ac, 0x0095, 0x008a, 0x00f2, 0x00e1, 0x00c3, 0x0178, 0x0011,
    0x0003, 0x0004, 0x000c, 0x0014, 0x0023, 0x003e, 0x0035, 0x002f,
    0x0053, 0x004b, 0x0044, 0x0077, 0x00c9, 0x006b, 0x00cf, 0x0009,
    0x000f, 0x000d, 0x0017, 0x0026, 0x0043, 0x003a, 0x0067, 0x005a,
    0x00a1, 0x0048, 0x007f, 0x0075, 0x006e, 0x00d1, 0x00ce, 0x0010,
    0x002d, 0x0015, 0x0027, 0x0045, 0x0040, 0x0072, 0x0063, 0x0057,
    0x009e, 0x008c, 0x00fc, 0x00d4, 0x00c7, 0x0183, 0x016d, 0x001a,
    0x004b, 0x0024, 0x0044, 0x0041, 0x0073, 0x0065, 0x00b3, 0x00a4,
    0x009b, 0x0108, 0x00f6, 0x00e2, 0x018b, 0x017e, 0x016a, 0x0009,
    0x0042, 0x001e, 0x003b, 0x0038, 0x0066, 0x00b9, 0x00ad, 0x0109,
    0x008e, 0x00fd, 0x00e8, 0x0190, 0x0184, 0x017a, 0x01bd, 0x0010,
    0x006f, 0x0036, 0x0034, 0x0064, 0x00b8, 0x00b2, 0x00a0, 0x0085,
    0x0101, 0x00f4, 0x00e4, 0x00d9, 0x0181, 0x016e, 0x02cb, 0x000a,
    0x0062, 0x0030, 0x005b, 0x0058, 0x00a5, 0x009d, 0x0094, 0x0105,
    0x00f8, 0x0197, 0x018d, 0x0174, 0x017c, 0x0379, 0x0374, 0x0008,
    0x0055, 0x0054, 0x0051, 0x009f, 0x009c, 0x008f, 0x0104, 0x00f9,
    0x01ab, 0x0191, 0x0188, 0x017f, 0x02d7, 0x02c9, 0x02c4, 0x0007,
    0x009a, 0x004c, 0x0049, 0x008d, 0x0083, 0x0100, 0x00f5, 0x01aa,
    0x0196, 0x018a, 0x0180, 0x02df, 0x0167, 0x02c6, 0x0160, 0x000b,
    0x008b, 0x0081, 0x0043, 0x007d, 0x00f7, 0x00e9, 0x00e5, 0x00db,
    0x0189, 0x02e7, 0x02e1, 0x02d0, 0x0375, 0x0372, 0x01b7, 0x0004,
    0x00f3, 0x0078, 0x0076, 0x0073, 0x00e3, 0x00df, 0x018c, 0x02ea,
    0x02e6, 0x02e0, 0x02d1, 0x02c8, 0x02c2, 0x00df, 0x01b4, 0x0006,
    0x00ca, 0x00e0, 0x00de, 0x00da, 0x00d8, 0x0185, 0x0182, 0x017d,
    0x016c, 0x0378, 0x01bb, 0x02c3, 0x01b8, 0x01b5, 0x06c0, 0x0004,
    0x02eb, 0x00d3, 0x00d2, 0x00d0, 0x0172, 0x017b, 0x02de, 0x02d3,
    0x02ca, 0x06c7, 0x0373, 0x036d, 0x036c, 0x0d83, 0x0361, 0x0002,
    0x0179, 0x0171, 0x0066, 0x00bb, 0x02d6, 0x02d2, 0x0166, 0x02c7,
    0x02c5, 0x0362, 0x06c6, 0x0367, 0x0d82, 0x0366, 0x01b2, 0x0000,
    0x000c, 0x000a, 0x0007, 0x000b, 0x000a, 0x0011, 0x000b, 0x0009,
    0x000d, 0x000c, 0x000a, 0x0007, 0x0005, 0x0003, 0x0001, 0x0003,
];
pub(crate) static BITS_16: [u8; 256] = [
    1, 4, 6, 8, 9, 9, 10, 10,
    11, 11, 11, 12, 12, 12, 13, 9,
    3, 4, 6, 7, 8, 9, 9, 9,
    10, 10, 10, 11, 12, 11, 12, 8,
    6, 6, 7, 8, 9, 9, 10, 10,
    11, 10, 11, 11, 11, 12, 12, 9,
    8, 7, 8, 9, 9, 10, 10, 10,
    11, 11, 12, 12, 12, 13, 13, 10,
    9, 8, 9, 9, 10, 10, 11, 11,
    11, 12, 12, 12, 13, 13, 13, 9,
    9, 8, 9, 9, 10, 11, 11, 12,
    11, 12, 12, 13, 13, 13, 14, 10,
    10, 9, 9, 10, 11, 11, 11, 11,
    12, 12, 12, 12, 13, 13, 14, 10,
    10, 9, 10, 10, 11, 11, 11, 12,
    12, 13, 13, 13, 13, 15, 15, 10,
    10, 10, 10, 11, 11, 11, 12, 12,
    13, 13, 13, 13, 14, 14, 14, 10,
    11, 10, 10, 11, 11, 12, 12, 13,
    13, 13, 13, 14, 13, 14, 13, 11,
    11, 11, 10, 11, 12, 12, 12, 12,
    13, 14, 14, 14, 15, 15, 14, 10,
    12, 11, 11, 11, 12, 12, 13, 14,
    14, 14, 14, 14, 14, 13, 14, 11,
    12, 12, 12, 12, 12, 13, 13, 13,
    13, 15, 14, 14, 14, 14, 16, 11,
    14, 12, 12, 12, 13, 13, 14, 14,
    14, 16, 15, 15, 15, 17, 15, 11,
    13, 13, 11, 12, 14, 14, 13, 14,
    14, 15, 16, 15, 17, 15, 14, 11,
    9, 8, 8, 9, 9, 10, 10, 10,
    11, 11, 11, 11, 11, 11, 11, 8,
];

pub(crate) static CODES_24: [u16; 256] = [
    0x000f, 0x000d, 0x002e, 0x0050, 0x0092, 0x0106, 0x00f8, 0x01b2,
    0x01aa, 0x029d, 0x028d, 0x0289, 0x026d, 0x0205, 0x0408, 0x0058,
    0x000e, 0x000c, 0x0015, 0x0026, 0x0047, 0x0082, 0x007a, 0x00d8,
    0x00d1, 0x00c6, 0x0147, 0x0159, 0x013f, 0x0129, 0x0117, 0x002a,
    0x002f, 0x0016, 0x0029, 0x004a, 0x0044, 0x0080, 0x0078, 0x00dd,
    0x00cf, 0x00c2, 0x00b6, 0x0154, 0x013b, 0x0127, 0x021d, 0x0012,
    0x0051, 0x0027, 0x004b, 0x0046, 0x0086, 0x007d, 0x0074, 0x00dc,
    0x00cc, 0x00be, 0x00b2, 0x0145, 0x0137, 0x0125, 0x010f, 0x0010,
    0x0093, 0x0048, 0x0045, 0x0087, 0x007f, 0x0076, 0x0070, 0x00d2,
    0x00c8, 0x00bc, 0x0160, 0x0143, 0x0132, 0x011d, 0x021c, 0x000e,
    0x0107, 0x0081, 0x0084, 0x007e, 0x0077, 0x0072, 0x00d6, 0x00ca,
    0x00c0, 0x00b4, 0x0155, 0x013d, 0x012d, 0x0119, 0x0106, 0x000c,
    0x00f9, 0x007b, 0x0079, 0x0075, 0x0071, 0x00d7, 0x00ce, 0x00c3,
    0x00b9, 0x015b, 0x014a, 0x0134, 0x0123, 0x0110, 0x0208, 0x000a,
    0x01b3, 0x00db, 0x00de, 0x00da, 0x00d3, 0x00cb, 0x00c4, 0x00bb,
    0x0161, 0x014c, 0x0139, 0x012a, 0x011b, 0x0213, 0x020b, 0x0009,
    0x01ab, 0x00d4, 0x00d0, 0x00cd, 0x00c9, 0x00c1, 0x00ba, 0x00b2,
    0x00ad, 0x0140, 0x012f, 0x011e, 0x0210, 0x0209, 0x029f, 0x0007,
    0x029e, 0x00c7, 0x00c5, 0x00bf, 0x0019, 0x00af, 0x00ae, 0x0141,
    0x0131, 0x0121, 0x0113, 0x020f, 0x0207, 0x029c, 0x028c, 0x0006,
    0x0288, 0x0148, 0x00c5, 0x00b8, 0x00b9, 0x00c4, 0x0149, 0x0133,
    0x0124, 0x0115, 0x0219, 0x0218, 0x026c, 0x0119, 0x0117, 0x0005,
    0x0158, 0x015a, 0x0142, 0x00b3, 0x00ac, 0x013c, 0x0130, 0x0122,
    0x0114, 0x020a, 0x0212, 0x014d, 0x014b, 0x013a, 0x0135, 0x0004,
    0x012e, 0x012b, 0x013e, 0x012c, 0x0118, 0x0138, 0x0126, 0x0211,
    0x0206, 0x0120, 0x011c, 0x011a, 0x0116, 0x0111, 0x010d, 0x0003,
    0x00c6, 0x008d, 0x0128, 0x011f, 0x0214, 0x0215, 0x0088, 0x010b,
    0x00df, 0x00c7, 0x00bd, 0x00b8, 0x00b7, 0x00b5, 0x00b3, 0x0002,
    0x0409, 0x0118, 0x0116, 0x0112, 0x020e, 0x00b1, 0x00ab, 0x008a,
    0x0089, 0x0085, 0x0080, 0x005d, 0x0047, 0x000d, 0x0007, 0x0001,
    0x0057, 0x0014, 0x0013, 0x0005, 0x000f, 0x000d, 0x000b, 0x0008,
    0x0000, 0x002d, 0x002f, 0x0030, 0x0054, 0x0073, 0x0003, 0x0004,
];
pub(crate) static BITS_24: [u8; 256] = [
    4, 4, 6, 7, 8, 9, 9, 10,
    10, 11, 11, 11, 11, 11, 12, 9,
    4, 4, 5, 6, 7, 8, 8, 9,
    9, 9, 10, 10, 10, 10, 10, 8,
    6, 5, 6, 7, 7, 8, 8, 9,
    9, 9, 9, 10, 10, 10, 11, 7,
    7, 6, 7, 7, 8, 8, 8, 9,
    9, 9, 9, 10, 10, 10, 10, 7,
    8, 7, 7, 8, 8, 8, 8, 9,
    9, 9, 10, 10, 10, 10, 11, 7,
    9, 8, 8, 8, 8, 8, 9, 9,
    9, 9, 10, 10, 10, 10, 10, 7,
    9, 8, 8, 8, 8, 9, 9, 9,
    9, 10, 10, 10, 10, 10, 11, 7,
    10, 9, 9, 9, 9, 9, 9, 9,
    10, 10, 10, 10, 10, 11, 11, 8,
    10, 9, 9, 9, 9, 9, 9, 10,
    10, 10, 10, 10, 11, 11, 11, 8,
    11, 10, 9, 9, 7, 10, 10, 10,
    10, 10, 11, 11, 11, 11, 11, 8,
    11, 10, 10, 10, 10, 10, 10, 10,
    10, 11, 11, 11, 11, 11, 11, 8,
    10, 10, 10, 10, 10, 10, 10, 10,
    11, 11, 11, 10, 10, 10, 10, 8,
    10, 10, 10, 10, 10, 10, 10, 11,
    11, 10, 10, 10, 10, 10, 10, 8,
    10, 10, 10, 10, 10, 10, 10, 9,
    9, 9, 9, 9, 9, 9, 9, 8,
    12, 11, 11, 11, 11, 9, 9, 9,
    9, 9, 9, 9, 9, 6, 5, 8,
    8, 7, 7, 7, 7, 7, 7, 8,
    8, 8, 8, 8, 8, 8, 6, 6,
];

pub(crate) static CODES_32: [u16; 16] = [
    0x0001, 0x0005, 0x0004, 0x0005, 0x0006, 0x0005, 0x0004, 0x0004,
    0x0007, 0x0003, 0x0006, 0x0000, 0x0007, 0x0002, 0x0003, 0x0001,
];
pub(crate) static BITS_32: [u8; 16] = [
    1, 4, 4, 5, 4, 6, 5, 6,
    4, 5, 5, 6, 5, 6, 6, 6,
];

pub(crate) static CODES_33: [u16; 16] = [
    0x000f, 0x000e, 0x000d, 0x000c, 0x000b, 0x000a, 0x0009, 0x0008,
    0x0007, 0x0006, 0x0005, 0x0004, 0x0003, 0x0002, 0x0001, 0x0000,
];
pub(crate) static BITS_33: [u8; 16] = [
    4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4,
];
