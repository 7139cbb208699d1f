//! `buf_contract` 集成测试：聚焦堆缓冲 `ByteListBuf` 的视图、冻结与比较契约。
//!
//! # 测试总览（Why）
//! - 视图零拷贝与冻结传播是上层生成代码依赖的核心不变式，任何回归都会表现为静默的数据错乱；
//! - 越界与只读写入必须在修改任何字节前失败，这里逐一验证“失败不留痕”；
//! - 变长字典序（先比长度）是显式约定，单独锁定。

use std::{cmp::Ordering, sync::mpsc, thread, time::Duration};

use spark_databuf::{AnyBuf, Buf, ByteListBuf, Charset, DataError, Int52};

/// 持有零拷贝借用期间，对已冻结存储的写入立即报告只读，而不是等待借用释放。
#[test]
fn frozen_write_does_not_wait_for_borrowed_array() {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let buf = ByteListBuf::copy_of(&[1, 2, 3, 4]);
        let view = buf.sub_list(1, 3).expect("创建视图");
        buf.freeze();
        let borrowed = buf.as_array();
        assert!(borrowed.is_borrowed());
        let direct = buf.set_byte(0, 9);
        let through_view = view.write_bytes(0, &[7, 7]);
        let through_stream = buf.binary_output_stream(0, 4).map(|_| ());
        drop(borrowed);
        let _ = tx.send((direct, through_view, through_stream));
    });
    let (direct, through_view, through_stream) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("冻结写入应立即返回");
    assert!(matches!(direct, Err(DataError::ImmutableViolation { .. })));
    assert!(matches!(through_view, Err(DataError::ImmutableViolation { .. })));
    assert!(matches!(through_stream, Err(DataError::ImmutableViolation { .. })));
}

/// 冻结根缓冲后，先前创建的视图及其子视图一并变为只读。
#[test]
fn freeze_propagates_to_existing_and_nested_views() {
    let buf = ByteListBuf::wrap(vec![0, 1, 2, 3, 4]);
    let view = buf.sub_list(1, 3).expect("创建视图");
    assert!(view.is_mutable());
    buf.freeze();
    assert!(!view.is_mutable());
    let nested = view.sub_list(0, 1).expect("创建嵌套视图");
    assert!(!nested.is_mutable());
    let err = nested.set_byte(0, 7).expect_err("冻结后写入应失败");
    assert!(matches!(err, DataError::ImmutableViolation { .. }));
    assert_eq!(buf.to_byte_array(), vec![0, 1, 2, 3, 4]);
}

/// 在视图上冻结同样作用于根缓冲。
#[test]
fn freezing_a_view_freezes_the_shared_storage() {
    let buf = ByteListBuf::copy_of(&[1, 2, 3]);
    let view = buf.sub_list(0, 2).expect("创建视图");
    view.freeze();
    view.freeze();
    assert!(!buf.is_mutable());
    assert!(buf.add(4).is_err());
}

/// 通过父缓冲写入的字节对视图立即可见。
#[test]
fn parent_writes_are_visible_through_views() {
    let buf = ByteListBuf::wrap(vec![0, 1, 2, 3, 4]);
    let view = buf.sub_list(1, 3).expect("创建视图");
    buf.set_byte(1, 99).expect("写入父缓冲");
    assert_eq!(view.get_byte(0).expect("读取视图"), 99);
    view.set_byte(1, 42).expect("写入视图");
    assert_eq!(buf.get_byte(2).expect("读取父缓冲"), 42);
}

/// 全范围 `sub_list` 返回同一句柄语义，`sub_list_forced` 总是新建定长视图。
#[test]
fn full_range_sub_list_versus_forced() {
    let buf = ByteListBuf::copy_of(&[1, 2, 3]);
    let same = buf.sub_list(0, 3).expect("全范围视图");
    assert!(!same.is_view());
    let forced = buf.sub_list_forced(0, 3).expect("强制视图");
    assert!(forced.is_view());
    assert!(forced.shares_storage_with(&buf));
    buf.add(4).expect("根缓冲追加");
    assert_eq!(same.size(), 4);
    assert_eq!(forced.size(), 3);
}

/// 越界参数在任何状态改变之前失败。
#[test]
fn out_of_range_is_reported_before_mutation() {
    let buf = ByteListBuf::copy_of(&[1, 2, 3, 4]);
    assert!(matches!(
        buf.set_int(1, -1),
        Err(DataError::OutOfRange { .. })
    ));
    assert!(matches!(
        buf.write_bytes(3, &[9, 9]),
        Err(DataError::OutOfRange { .. })
    ));
    assert!(matches!(buf.sub_list(3, 2), Err(DataError::OutOfRange { .. })));
    assert!(matches!(buf.get_long(0), Err(DataError::OutOfRange { .. })));
    assert_eq!(buf.to_byte_array(), vec![1, 2, 3, 4]);
}

/// 冻结后越界写入报告越界而非只读。
#[test]
fn range_is_checked_before_mutability() {
    let buf = ByteListBuf::copy_of(&[1, 2]);
    buf.freeze();
    assert!(matches!(buf.set_int(0, 1), Err(DataError::OutOfRange { .. })));
    assert!(matches!(
        buf.set_short(0, 1),
        Err(DataError::ImmutableViolation { .. })
    ));
}

/// 大端与小端访问器对同一组字节给出不同结果。
#[test]
fn int_and_int_le_disagree_on_byte_order() {
    let buf = ByteListBuf::create_zeroes(4);
    buf.set_int(0, 0x0102_0304).expect("写入大端整数");
    assert_eq!(buf.to_byte_array(), vec![1, 2, 3, 4]);
    assert_eq!(buf.get_int_le(0).expect("小端读取"), 0x0403_0201);
    buf.set_int_le(0, 0x0102_0304).expect("写入小端整数");
    assert_eq!(buf.to_byte_array(), vec![4, 3, 2, 1]);
}

/// 其余定宽原语在视图偏移下同样往返一致。
#[test]
fn primitive_accessors_round_trip_inside_a_view() {
    let root = ByteListBuf::create_zeroes(40);
    let view = root.sub_list(3, 40).expect("创建视图");
    view.set_boolean(0, true).expect("bool");
    view.set_short(1, -2).expect("short");
    view.set_char(3, 0xFFFE).expect("char");
    view.set_long(5, i64::MIN + 7).expect("long");
    view.set_float(13, 1.5).expect("float");
    view.set_double(17, -0.25).expect("double");
    let int52 = Int52::from_long(999_619_292_661).expect("Int52");
    view.set_int52(25, int52).expect("int52");

    assert!(view.get_boolean(0).expect("bool"));
    assert_eq!(view.get_short(1).expect("short"), -2);
    assert_eq!(view.get_unsigned_short(1).expect("ushort"), 0xFFFE);
    assert_eq!(view.get_char(3).expect("char"), 0xFFFE);
    assert_eq!(view.get_long(5).expect("long"), i64::MIN + 7);
    assert_eq!(view.get_float(13).expect("float"), 1.5);
    assert_eq!(view.get_double(17).expect("double"), -0.25);
    assert_eq!(view.get_int52(25).expect("int52"), int52);
    assert_eq!(root.get_byte(3).expect("根缓冲可见"), 1);
}

/// 先比长度：单字节缓冲总排在双字节缓冲之前。
#[test]
fn shorter_buffer_sorts_first() {
    let short = ByteListBuf::wrap(vec![5]);
    let long = ByteListBuf::wrap(vec![1, 1]);
    assert_eq!(short.compare_to(&long), Ordering::Less);
    assert!(short < long);
    let a = ByteListBuf::wrap(vec![1, 0x80]);
    let b = ByteListBuf::wrap(vec![1, 0x7F]);
    assert_eq!(a.compare_to(&b), Ordering::Greater);
    assert_eq!(a.compare_to(&a.copy()), Ordering::Equal);
}

/// 区间比较与数组重载。
#[test]
fn range_equals_respects_offsets_and_bounds() {
    let a = ByteListBuf::copy_of(b"xxabcx");
    let b = ByteListBuf::copy_of(b"abc");
    assert!(a.range_equals(2, &b, 0, 3).expect("区间比较"));
    assert!(!a.range_equals(1, &b, 0, 3).expect("区间比较"));
    assert!(a.range_equals_array(2, b"zabc", 1, 3).expect("数组比较"));
    assert!(matches!(
        a.range_equals(4, &b, 0, 3),
        Err(DataError::OutOfRange { .. })
    ));
}

/// `copy` 与 `copy_of_range` 产生独立存储。
#[test]
fn copies_are_independent() {
    let buf = ByteListBuf::copy_of(&[1, 2, 3, 4]);
    let copy = buf.copy_of_range(1, 3).expect("复制区间");
    buf.set_byte(1, 0).expect("修改源");
    assert_eq!(copy.to_byte_array(), vec![2, 3]);
    buf.freeze();
    assert!(copy.is_mutable());
    assert!(!copy.shares_storage_with(&buf));
}

/// 视图窗口固定，不能增长。
#[test]
fn views_reject_growth() {
    let buf = ByteListBuf::wrap_range(vec![1, 2, 3, 4], 1, 3).expect("窗口包装");
    assert_eq!(buf.to_byte_array(), vec![2, 3]);
    assert!(matches!(
        buf.add(9),
        Err(DataError::UnsupportedOperation { .. })
    ));
}

/// 严格数组访问仅在存在恰好等长的底层数组时零拷贝返回。
#[test]
fn strict_array_accessors() {
    let buf = ByteListBuf::copy_of(&[1, 2, 3]);
    let strict = buf.as_array_strict().expect("根缓冲可借用");
    assert!(strict.is_borrowed());
    assert_eq!(&strict[..], &[1, 2, 3]);
    drop(strict);
    let tail = buf.sub_list(1, 3).expect("创建视图");
    assert!(tail.as_array_strict().is_none());
    assert_eq!(&tail.as_array()[..], &[2, 3]);
}

/// 文本读取与分块写出。
#[test]
fn string_and_write_to() {
    let buf = ByteListBuf::copy_of("ciao mondo".as_bytes());
    assert_eq!(buf.get_string(5, 5, Charset::Utf8).expect("解码"), "mondo");
    assert_eq!(buf.to_string_with(Charset::UsAscii).expect("解码"), "ciao mondo");
    let mut sink = Vec::new();
    buf.write_to_chunked(&mut sink, 3).expect("写出");
    assert_eq!(sink, b"ciao mondo");
    assert!(buf.write_to_chunked(&mut sink, 0).is_err());
}

/// 输入流直接别名堆存储，输出流写入直接落在缓冲上。
#[test]
fn positional_streams_alias_heap_storage() {
    let buf = ByteListBuf::copy_of(&[1, 2, 3, 4]);
    let mut input = buf.binary_input_stream();
    buf.set_byte(0, 9).expect("写入");
    assert_eq!(input.read_byte(), Some(9));

    let mut output = buf.binary_output_stream(2, 4).expect("输出流");
    output.write(&[7, 8]).expect("写入窗口");
    assert_eq!(buf.to_byte_array(), vec![9, 2, 7, 8]);

    buf.freeze();
    assert!(matches!(
        buf.binary_output_stream(0, 1),
        Err(DataError::ImmutableViolation { .. })
    ));
}

/// `AnyBuf` 的相等、排序与哈希跟随内容。
#[test]
fn any_buf_follows_content_semantics() {
    use std::collections::HashSet;

    let a = AnyBuf::from(ByteListBuf::copy_of(&[1, 2]));
    let b = AnyBuf::from(ByteListBuf::copy_of(&[0, 1, 2]).sub_list(1, 3).expect("视图"));
    assert_eq!(a, b);
    let mut set = HashSet::new();
    set.insert(a.clone());
    assert!(set.contains(&b));
    assert!(!a.is_native());
    assert_eq!(a.into_heap().to_byte_array(), vec![1, 2]);
}
