use dbt_backend::code_buffer::RelocKind;
use dbt_backend::CodeBuffer;
use dbt_core::EncodingError;

#[test]
fn test_emit_and_read() {
    let mut buf = CodeBuffer::new();
    buf.emit_u8(0x90); // NOP
    buf.emit_u32(0xDEADBEEF);
    assert_eq!(buf.offset(), 5);
    assert_eq!(buf.as_slice()[0], 0x90);
    assert_eq!(buf.read_u32(1), 0xDEADBEEF);
}

#[test]
fn test_patch() {
    let mut buf = CodeBuffer::new();
    buf.emit_u32(0);
    buf.patch_u32(0, 0x12345678);
    assert_eq!(buf.read_u32(0), 0x12345678);
}

#[test]
fn test_label_backward_and_forward() {
    let mut buf = CodeBuffer::new();
    let back = buf.new_label();
    buf.bind(back).unwrap();
    buf.emit_u8(0x90);
    buf.emit_label_ref(back, RelocKind::Rel32); // field at 1..5
    let fwd = buf.new_label();
    buf.emit_label_ref(fwd, RelocKind::Rel32); // field at 5..9
    buf.emit_u8(0x90);
    buf.bind(fwd).unwrap(); // at 10
    assert!(buf.has_pending_uses());

    buf.resolve_links().unwrap();
    assert!(!buf.has_pending_uses());
    assert_eq!(buf.read_u32(1) as i32, -5);
    assert_eq!(buf.read_u32(5) as i32, 1);
}

#[test]
fn test_unbound_label() {
    let mut buf = CodeBuffer::new();
    let _unused = buf.new_label();
    let label = buf.new_label();
    buf.emit_label_ref(label, RelocKind::Rel32);
    assert_eq!(
        buf.resolve_links(),
        Err(EncodingError::UnboundLabel(label.id()))
    );
}

#[test]
fn test_label_rebound() {
    let mut buf = CodeBuffer::new();
    let label = buf.new_label();
    buf.bind(label).unwrap();
    buf.emit_u8(0xC3);
    assert_eq!(buf.bind(label), Err(EncodingError::LabelRebound(label.id())));
}
