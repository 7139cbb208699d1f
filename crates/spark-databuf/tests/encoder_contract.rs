//! `encoder_contract` 集成测试：零分配转码器的往返、策略分叉与线程隔离。
//!
//! # 测试总览（Why）
//! - UTF-8 往返必须保持字节数等于原文的 UTF-8 长度，覆盖多字节、代理对与组合附加符号；
//! - 宽松与严格策略只在非法输入上分叉：前者替换，后者报告 `EncodingFailure`；
//! - 线程本地字符缓冲只增不减，并发线程互不干扰。

use std::thread;

use bytes::{Bytes, BytesMut};
use spark_databuf::{
    DataError, EncoderPolicy, SafeByteArrayInputStream, SafeByteArrayOutputStream,
    ZeroAllocationEncoder, thread_decode_capacity,
};
use tracing_test::traced_test;

const SAMPLES: &[&str] = &[
    "",
    "ascii only",
    "àèìòù ñ ß",
    "漢字かなカナ한글",
    "emoji 😀🎉 and 𝄞",
    "e\u{0301} a\u{0308}\u{0323} combining",
];

/// 各类样本经由小草稿区往返，字节数与原文 UTF-8 长度一致。
#[test]
fn utf8_round_trip_preserves_text_and_length() {
    for policy in [EncoderPolicy::Lenient, EncoderPolicy::Strict] {
        for scratch in [4, 7, 4096] {
            let encoder = ZeroAllocationEncoder::new(policy).with_scratch_size(scratch);
            for text in SAMPLES {
                let mut sink = Vec::new();
                let produced = encoder.encode_to(text, &mut sink).expect("编码");
                assert_eq!(produced, text.len());
                assert_eq!(sink, text.as_bytes());
                let mut source = sink.as_slice();
                let decoded = encoder.decode_from(&mut source, produced).expect("解码");
                assert_eq!(decoded, *text);
            }
        }
    }
}

/// 编码可写入 `BytesMut` 与位置输出流，解码可读自 `Bytes` 与位置输入流。
#[test]
fn sinks_and_sources_interoperate() {
    let encoder = ZeroAllocationEncoder::default();
    let mut bytes = BytesMut::new();
    encoder.encode_to("héllo", &mut bytes).expect("写入 BytesMut");
    let mut source = Bytes::from(bytes.to_vec());
    assert_eq!(encoder.decode_from(&mut source, 6).expect("读取 Bytes"), "héllo");

    let mut out = SafeByteArrayOutputStream::new();
    encoder.encode_to("wörld", &mut out).expect("写入输出流");
    let mut input = SafeByteArrayInputStream::from_vec(out.to_vec());
    assert_eq!(encoder.decode_from(&mut input, 3).expect("前缀"), "wö");
    assert_eq!(input.position(), 3);
}

/// 孤立代理项：宽松替换为 `?`，严格报告失败。
#[test]
fn lone_surrogate_splits_policies() {
    let units: [u16; 3] = [0x0061, 0xD800, 0x0062];
    let mut lenient = Vec::new();
    ZeroAllocationEncoder::LENIENT
        .encode_utf16_to(&units, &mut lenient)
        .expect("宽松编码");
    assert_eq!(lenient, b"a?b");

    let mut strict = Vec::new();
    let err = ZeroAllocationEncoder::STRICT
        .encode_utf16_to(&units, &mut strict)
        .expect_err("严格编码应失败");
    assert!(matches!(err, DataError::EncodingFailure { .. }));

    let pair: Vec<u16> = "😀".encode_utf16().collect();
    let mut ok = Vec::new();
    ZeroAllocationEncoder::STRICT
        .encode_utf16_to(&pair, &mut ok)
        .expect("合法代理对");
    assert_eq!(ok, "😀".as_bytes());
}

/// 非法 UTF-8：宽松替换为 U+FFFD，严格报告失败。
#[test]
fn malformed_utf8_splits_policies() {
    let bytes = [b'a', 0xFF, b'b', 0xC0, 0x80];
    let lenient = ZeroAllocationEncoder::LENIENT.decode_slice(&bytes).expect("宽松解码");
    assert!(lenient.starts_with('a'));
    assert!(lenient.contains('\u{FFFD}'));
    assert!(lenient.contains('b'));
    assert!(matches!(
        ZeroAllocationEncoder::STRICT.decode_slice(&bytes),
        Err(DataError::EncodingFailure { .. })
    ));
}

/// 声明长度超过数据源时报告越界。
#[test]
fn exhausted_source_is_out_of_range() {
    let mut source: &[u8] = b"abc";
    let err = ZeroAllocationEncoder::STRICT
        .decode_from(&mut source, 10)
        .expect_err("数据不足");
    assert!(matches!(err, DataError::OutOfRange { .. }));
}

/// 线程本地字符缓冲只增不减。
#[test]
fn thread_decode_buffer_grows_but_never_shrinks() {
    thread::spawn(|| {
        let big = "x".repeat(50_000);
        ZeroAllocationEncoder::LENIENT.decode_slice(big.as_bytes()).expect("大文本");
        let grown = thread_decode_capacity();
        assert!(grown >= 50_000);
        ZeroAllocationEncoder::LENIENT.decode_slice(b"tiny").expect("小文本");
        assert!(thread_decode_capacity() >= grown);
    })
    .join()
    .expect("线程正常结束");
}

/// 并发线程各自持有草稿区，结果互不干扰。
#[test]
fn concurrent_threads_do_not_interleave() {
    let handles: Vec<_> = (0..8)
        .map(|id| {
            thread::spawn(move || {
                let text = format!("线程-{id}-").repeat(500);
                let encoder = ZeroAllocationEncoder::STRICT.with_scratch_size(13);
                for _ in 0..20 {
                    let mut sink = Vec::new();
                    encoder.encode_to(&text, &mut sink).expect("编码");
                    assert_eq!(encoder.decode_slice(&sink).expect("解码"), text);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("线程正常结束");
    }
}

/// 解码缓冲扩容时发出 trace 事件。
#[test]
#[traced_test]
fn decode_buffer_growth_is_traced() {
    let big = "y".repeat(200_000);
    ZeroAllocationEncoder::LENIENT.decode_slice(big.as_bytes()).expect("大文本");
    assert!(logs_contain("thread-local decode buffer grown"));
}
