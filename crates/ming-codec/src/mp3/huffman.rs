//! Layer III Huffman 解码器
//!
//! 34 张解码树在构造时从字面量码表一次性建成, 之后只读共享.
//! 每棵树是一个扁平的节点竞技场, 用两条平行的 i32 数组编码:
//! 终结节点在 bit-0 槽打零标记, 伴随槽存放半字节打包的 (x, y);
//! 内部节点的两个槽分别存放到对应子节点的前向偏移.

use ming_core::{MingError, MingResult};

use super::bit_reservoir::BitReservoir;
use super::tables::{TABLE_SPECS, TableSpec};

/// 树遍历深度上限: 任何合法码字都不会超过这一深度
const MAX_TREE_DEPTH: u32 = 32;

/// Huffman 解码结果
///
/// 普通表产出带符号 (x, y) 对; count1 表产出四个带符号的 1 比特幅值,
/// 顺序固定为 v, w, x, y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuffmanValue {
    Pair { x: i32, y: i32 },
    Quad { v: i32, w: i32, x: i32, y: i32 },
}

/// 单张 Huffman 解码表
pub struct HuffmanTable {
    xlen: u32,
    ylen: u32,
    linbits: u32,
    quad: bool,
    /// bit=0 分支: 0 为终结标记, 否则为前向偏移
    branch0: Vec<i32>,
    /// bit=1 分支: 终结节点存放打包的 (x, y), 否则为前向偏移
    branch1: Vec<i32>,
}

impl HuffmanTable {
    fn build(spec: &TableSpec) -> Self {
        let mut table = Self {
            xlen: spec.xlen,
            ylen: spec.ylen,
            linbits: spec.linbits,
            quad: spec.quad,
            branch0: Vec::new(),
            branch1: Vec::new(),
        };
        let Some((codes, bits)) = spec.data else {
            return table;
        };
        // 根节点
        table.branch0.push(0);
        table.branch1.push(0);
        for (i, (&code, &len)) in codes.iter().zip(bits.iter()).enumerate() {
            let x = i as u32 / spec.ylen;
            let y = i as u32 % spec.ylen;
            table.insert(u32::from(code), u32::from(len), x, y);
        }
        table
    }

    /// 沿码字逐位下降, 途中按需分配节点, 码字末端写入终结值.
    /// 码表是完备前缀码, 建成后不存在未赋值的分支槽.
    fn insert(&mut self, code: u32, len: u32, x: u32, y: u32) {
        let mut point = 0usize;
        for i in (0..len).rev() {
            let bit = (code >> i) & 1;
            let slot = if bit != 0 {
                self.branch1[point]
            } else {
                self.branch0[point]
            };
            if slot == 0 {
                let child = self.branch0.len();
                self.branch0.push(0);
                self.branch1.push(0);
                let offset = (child - point) as i32;
                if bit != 0 {
                    self.branch1[point] = offset;
                } else {
                    self.branch0[point] = offset;
                }
                point = child;
            } else {
                point += slot as usize;
            }
        }
        self.branch1[point] = ((x << 4) | y) as i32;
    }

    /// 解码一个值: 普通表返回 (x, y) 对, count1 表返回四元组.
    ///
    /// 树遍历耗尽深度上限仍未到达终结节点时返回错误; 这属于单个
    /// 系数粒度的可吞咽失败, 上游应跳过该粒度而不是中止整个流.
    pub fn decode(&self, reservoir: &mut BitReservoir) -> MingResult<HuffmanValue> {
        if self.branch0.is_empty() {
            // 退化表: 不消费比特
            return Ok(HuffmanValue::Pair { x: 0, y: 0 });
        }
        let mut point = 0usize;
        let mut level = MAX_TREE_DEPTH;
        let packed = loop {
            if self.branch0[point] == 0 {
                break self.branch1[point];
            }
            if level == 0 {
                return Err(MingError::InvalidData(
                    "Huffman 树遍历超出深度上限".into(),
                ));
            }
            let offset = if reservoir.get_one_bit() {
                self.branch1[point]
            } else {
                self.branch0[point]
            };
            point += offset as usize;
            level -= 1;
        };
        let x = (packed >> 4) & 0xF;
        let y = packed & 0xF;

        if self.quad {
            // count1 表: y 的 4 个比特拆成 v, w, x, y 幅值, 各跟一个符号位
            let mut v = (y >> 3) & 1;
            let mut w = (y >> 2) & 1;
            let mut x = (y >> 1) & 1;
            let mut y = y & 1;
            if v != 0 && reservoir.get_one_bit() {
                v = -v;
            }
            if w != 0 && reservoir.get_one_bit() {
                w = -w;
            }
            if x != 0 && reservoir.get_one_bit() {
                x = -x;
            }
            if y != 0 && reservoir.get_one_bit() {
                y = -y;
            }
            return Ok(HuffmanValue::Quad { v, w, x, y });
        }

        // 逃逸码: 最大表索引意味着真实幅值由 linbits 个原始比特续接
        let mut x = x;
        let mut y = y;
        if self.linbits != 0 && x == self.xlen as i32 - 1 {
            x += reservoir.get_bits(self.linbits) as i32;
        }
        if x != 0 && reservoir.get_one_bit() {
            x = -x;
        }
        if self.linbits != 0 && y == self.ylen as i32 - 1 {
            y += reservoir.get_bits(self.linbits) as i32;
        }
        if y != 0 && reservoir.get_one_bit() {
            y = -y;
        }
        Ok(HuffmanValue::Pair { x, y })
    }
}

/// 全部 34 张解码表, 一次性构建的不可变集合
pub struct HuffmanTables {
    tables: Vec<HuffmanTable>,
}

impl HuffmanTables {
    /// 从字面量码表构建全部解码树
    pub fn new() -> Self {
        Self {
            tables: TABLE_SPECS.iter().map(HuffmanTable::build).collect(),
        }
    }

    /// 用第 `table` 张表从储备库解码一个值
    pub fn decode(&self, table: usize, reservoir: &mut BitReservoir) -> MingResult<HuffmanValue> {
        let t = self
            .tables
            .get(table)
            .ok_or_else(|| MingError::InvalidData(format!("无效的 Huffman 表索引: {table}")))?;
        t.decode(reservoir)
    }
}

impl Default for HuffmanTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tables::{BITS_16, BITS_24, BITS_32, CODES_16, CODES_24, CODES_32};
    use super::*;

    /// 把若干 (码字, 码长) 依次打进储备库, 尾部补零对齐到字节
    fn feed(reservoir: &mut BitReservoir, pieces: &[(u32, u32)]) {
        let mut acc = 0u64;
        let mut nbits = 0u32;
        let mut flush = |acc: &mut u64, nbits: &mut u32| {
            while *nbits >= 8 {
                let byte = (*acc >> (*nbits - 8)) as u8;
                reservoir.put_byte(byte);
                *nbits -= 8;
                *acc &= (1u64 << *nbits) - 1;
            }
        };
        for &(code, len) in pieces {
            acc = (acc << len) | u64::from(code);
            nbits += len;
            flush(&mut acc, &mut nbits);
        }
        if nbits > 0 {
            reservoir.put_byte((acc << (8 - nbits)) as u8);
        }
    }

    #[test]
    fn test_退化表不消费比特() {
        let tables = HuffmanTables::new();
        let mut br = BitReservoir::new();
        for id in [0, 4, 14] {
            let v = tables.decode(id, &mut br).unwrap();
            assert_eq!(v, HuffmanValue::Pair { x: 0, y: 0 });
        }
        assert_eq!(br.bit_count(), 0);
    }

    #[test]
    fn test_表1_全部码字往返() {
        // 表 1: xlen = ylen = 2, 无逃逸码
        let tables = HuffmanTables::new();
        let data = [(0u32, 0u32), (0, 1), (1, 0), (1, 1)];
        let codes = [(0x1u32, 1u32), (0x1, 3), (0x1, 2), (0x0, 3)];
        for (&(x, y), &code) in data.iter().zip(codes.iter()) {
            let mut br = BitReservoir::new();
            // 码字 + 非零值的符号位 (全取正)
            let mut pieces = vec![code];
            if x != 0 {
                pieces.push((0, 1));
            }
            if y != 0 {
                pieces.push((0, 1));
            }
            feed(&mut br, &pieces);
            let v = tables.decode(1, &mut br).unwrap();
            assert_eq!(
                v,
                HuffmanValue::Pair {
                    x: x as i32,
                    y: y as i32
                }
            );
        }
    }

    #[test]
    fn test_符号位取负() {
        let tables = HuffmanTables::new();
        let mut br = BitReservoir::new();
        // 表 1 的 (1, 1): 码字 000, 两个符号位 1/0 -> (-1, 1)
        feed(&mut br, &[(0x0, 3), (1, 1), (0, 1)]);
        let v = tables.decode(1, &mut br).unwrap();
        assert_eq!(v, HuffmanValue::Pair { x: -1, y: 1 });
    }

    #[test]
    fn test_逃逸码_linbits5() {
        // 表 25 与表 24 共树, linbits = 5
        let tables = HuffmanTables::new();
        let mut br = BitReservoir::new();
        let idx = 15 * 16 + 15;
        let code = (u32::from(CODES_24[idx]), u32::from(BITS_24[idx]));
        // x: 逃逸 01010 (=10) 后符号位 1 -> -(15 + 10)
        // y: 逃逸 00000 后符号位 0 -> 15
        feed(
            &mut br,
            &[code, (0b01010, 5), (1, 1), (0b00000, 5), (0, 1)],
        );
        let v = tables.decode(25, &mut br).unwrap();
        assert_eq!(v, HuffmanValue::Pair { x: -25, y: 15 });
    }

    #[test]
    fn test_count1_四元组与符号序() {
        let tables = HuffmanTables::new();
        let mut br = BitReservoir::new();
        // 值 0b1011: v=1, w=0, x=1, y=1; 符号位依 v, x, y 顺序取 1, 0, 1
        let idx = 0b1011;
        feed(
            &mut br,
            &[
                (u32::from(CODES_32[idx]), u32::from(BITS_32[idx])),
                (1, 1),
                (0, 1),
                (1, 1),
            ],
        );
        let v = tables.decode(32, &mut br).unwrap();
        assert_eq!(
            v,
            HuffmanValue::Quad {
                v: -1,
                w: 0,
                x: 1,
                y: -1
            }
        );
    }

    #[test]
    fn test_共树表仅逃逸位宽不同() {
        // 表 16..=23 共享一棵树: 同一码字在不同 linbits 下幅值不同
        let tables = HuffmanTables::new();
        let idx = 15 * 16;
        let code = (u32::from(CODES_16[idx]), u32::from(BITS_16[idx]));

        let mut br = BitReservoir::new();
        // 表 16: linbits = 1, x 逃逸 1 比特 (1) -> 16, 符号正; y = 0
        feed(&mut br, &[code, (1, 1), (0, 1)]);
        assert_eq!(
            tables.decode(16, &mut br).unwrap(),
            HuffmanValue::Pair { x: 16, y: 0 }
        );

        let mut br = BitReservoir::new();
        // 表 23: linbits = 13, x 逃逸 13 比特
        feed(&mut br, &[code, (0x1FFF, 13), (0, 1)]);
        assert_eq!(
            tables.decode(23, &mut br).unwrap(),
            HuffmanValue::Pair { x: 15 + 0x1FFF, y: 0 }
        );
    }

    #[test]
    fn test_全部码表全部条目往返() {
        // 对 34 张表的每个条目: 按构造数据编码一次, 解码必须还原
        let tables = HuffmanTables::new();
        for (id, spec) in TABLE_SPECS.iter().enumerate() {
            let Some((codes, bits)) = spec.data else {
                continue;
            };
            for (i, (&code, &len)) in codes.iter().zip(bits.iter()).enumerate() {
                let x = i as u32 / spec.ylen;
                let y = i as u32 % spec.ylen;
                let mut pieces = vec![(u32::from(code), u32::from(len))];
                let expected = if spec.quad {
                    // 幅值位全取正号
                    let quad = [(y >> 3) & 1, (y >> 2) & 1, (y >> 1) & 1, y & 1];
                    for v in quad {
                        if v != 0 {
                            pieces.push((0, 1));
                        }
                    }
                    HuffmanValue::Quad {
                        v: quad[0] as i32,
                        w: quad[1] as i32,
                        x: quad[2] as i32,
                        y: quad[3] as i32,
                    }
                } else {
                    // 逃逸码全取 0, 符号位 x 负 y 正
                    let mut ex = x as i32;
                    let ey = y as i32;
                    if spec.linbits != 0 && x == spec.xlen - 1 {
                        pieces.push((0, spec.linbits));
                    }
                    if ex != 0 {
                        pieces.push((1, 1));
                        ex = -ex;
                    }
                    if spec.linbits != 0 && y == spec.ylen - 1 {
                        pieces.push((0, spec.linbits));
                    }
                    if ey != 0 {
                        pieces.push((0, 1));
                    }
                    HuffmanValue::Pair { x: ex, y: ey }
                };
                let mut br = BitReservoir::new();
                feed(&mut br, &pieces);
                let got = tables.decode(id, &mut br).unwrap();
                assert_eq!(got, expected, "表 {id} 条目 ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_乱码输入不越界() {
        // 任意比特序列都会落到某个终结节点或报错, 不会越界访问
        let tables = HuffmanTables::new();
        for id in [1, 13, 16, 24, 32, 33] {
            let mut br = BitReservoir::new();
            for v in [0xDEu8, 0xAD, 0xBE, 0xEF, 0x55, 0xAA] {
                br.put_byte(v);
            }
            let _ = tables.decode(id, &mut br);
        }
    }

    #[test]
    fn test_无效表索引() {
        let tables = HuffmanTables::new();
        let mut br = BitReservoir::new();
        assert!(tables.decode(34, &mut br).is_err());
    }
}
