//! 缓冲与编解码层的性质验证。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：以随机输入覆盖往返类性质：字节复制、定宽原语、Int52 线格式、UTF-8 文本，
//!   以及三种存储组合下 `range_equals` 的一致性；固定样本之外的边界组合交给 Proptest 探索。
//! - **设计手法 (How)**：每条性质只断言一个不变式，失败时 Proptest 会收缩到最小反例，便于定位。
//! - **合同 (What)**：性质对任意合法输入成立；越界输入不在生成域内，由契约测试单独覆盖。

use proptest::prelude::*;
use spark_databuf::{
    Buf, BufDataInput, BufDataOutput, ByteListBuf, Charset, DataInput, DataOutput, Int52,
    MemorySegmentBuf, NativeArena, ZeroAllocationEncoder,
};

/// 固定的 Int52 样本：低段连续值与若干大值。
#[test]
fn int52_fixed_samples_round_trip() {
    let extra = [0xF_FFFF_FFFF_FFFFi64, 1_099_511_627_775, 999_619_292_661];
    for n in (0..=300i64).chain(extra) {
        let value = Int52::from_long(n).expect("定义域内");
        let bytes = value.serialize();
        assert_eq!(bytes[0] & 0xF0, 0);
        assert_eq!(Int52::deserialize(&bytes).as_i64(), n);
    }
    assert!(Int52::from_long(-1).is_err());
    assert!(Int52::from_long(1i64 << 52).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// `copy_of(a).to_byte_array() == a`。
    #[test]
    fn copy_of_round_trips(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        prop_assert_eq!(ByteListBuf::copy_of(&bytes).to_byte_array(), bytes);
    }

    /// 任意合法偏移上的定宽原语写后读一致，且 `get_int` 与 `get_int_le` 互为字节反转。
    #[test]
    fn primitives_round_trip_at_any_offset(
        offset in 0usize..24,
        short in any::<i16>(),
        int in any::<i32>(),
        long in any::<i64>(),
        double in any::<f64>(),
    ) {
        let buf = ByteListBuf::create_zeroes(32);
        buf.set_short(offset, short).expect("short");
        prop_assert_eq!(buf.get_short(offset).expect("short"), short);
        buf.set_int(offset, int).expect("int");
        prop_assert_eq!(buf.get_int(offset).expect("int"), int);
        prop_assert_eq!(buf.get_int_le(offset).expect("int le"), int.swap_bytes());
        buf.set_long(offset, long).expect("long");
        prop_assert_eq!(buf.get_long(offset).expect("long"), long);
        buf.set_double(offset, double).expect("double");
        prop_assert_eq!(buf.get_double(offset).expect("double").to_bits(), double.to_bits());
    }

    /// Int52 定义域内任意值经 7 字节线格式往返。
    #[test]
    fn int52_round_trips_over_domain(n in 0u64..=Int52::MAX_VALUE) {
        let value = Int52::from_u64(n).expect("定义域内");
        prop_assert_eq!(Int52::deserialize(&value.serialize()).get(), n);
    }

    /// 定义域外的值一律拒绝。
    #[test]
    fn int52_rejects_out_of_domain(n in (Int52::MAX_VALUE + 1)..=u64::MAX) {
        prop_assert!(Int52::from_u64(n).is_err());
    }

    /// 任意文本经零分配转码器往返，字节数等于 UTF-8 长度。
    #[test]
    fn utf8_round_trips(text in "\\PC{0,200}", scratch in 4usize..64) {
        let encoder = ZeroAllocationEncoder::STRICT.with_scratch_size(scratch);
        let mut sink = Vec::new();
        let produced = encoder.encode_to(&text, &mut sink).expect("编码");
        prop_assert_eq!(produced, text.len());
        prop_assert_eq!(encoder.decode_slice(&sink).expect("解码"), text);
    }

    /// 回填写出的短文本经 `BufDataInput` 读回一致。
    #[test]
    fn short_text_round_trips_through_codec(text in "\\PC{0,120}") {
        let mut out = BufDataOutput::create();
        out.write_short_text(&text, Charset::Utf8).expect("写入");
        prop_assert_eq!(out.written(), 2 + text.len());
        let buf = out.into_buf().expect("取回");
        let mut input = BufDataInput::new(&buf);
        prop_assert_eq!(input.read_short_text(Charset::Utf8).expect("读回"), text);
    }

    /// 相同内容在堆-堆、原生-原生、原生-堆三条路径上的比较结果一致。
    #[test]
    fn equals_paths_agree(
        left in proptest::collection::vec(any::<u8>(), 1..96),
        flip in any::<prop::sample::Index>(),
        mutate in any::<bool>(),
    ) {
        let mut right = left.clone();
        if mutate {
            let index = flip.index(right.len());
            right[index] = right[index].wrapping_add(1);
        }
        let arena = NativeArena::new();
        let heap_l = ByteListBuf::copy_of(&left);
        let heap_r = ByteListBuf::copy_of(&right);
        let native_l = MemorySegmentBuf::of(arena.allocate_from(&left).expect("分配"));
        let native_r = MemorySegmentBuf::of(arena.allocate_from(&right).expect("分配"));
        let len = left.len();

        let heap_heap = heap_l.range_equals(0, &heap_r, 0, len).expect("堆-堆");
        let native_native = native_l.range_equals(0, &native_r, 0, len).expect("原生-原生");
        let native_heap = native_l.range_equals(0, &heap_r, 0, len).expect("原生-堆");
        prop_assert_eq!(heap_heap, !mutate);
        prop_assert_eq!(native_native, heap_heap);
        prop_assert_eq!(native_heap, heap_heap);
        prop_assert_eq!(native_l.compare_to(&heap_r), heap_l.compare_to(&heap_r));
    }

    /// 长度不同时排序只由长度决定。
    #[test]
    fn ordering_is_length_first(
        a in proptest::collection::vec(any::<u8>(), 0..16),
        b in proptest::collection::vec(any::<u8>(), 0..16),
    ) {
        prop_assume!(a.len() != b.len());
        let ordering = ByteListBuf::copy_of(&a).compare_to(&ByteListBuf::copy_of(&b));
        prop_assert_eq!(ordering, a.len().cmp(&b.len()));
    }
}
