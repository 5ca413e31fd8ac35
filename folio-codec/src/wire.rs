//! Primitive field encoders shared by every codec version.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use folio_core::{PageId, Position, SubscriberGroupId};
use folio_partition::Element;

use crate::error::{CodecError, CodecResult};

/// Checks that at least `need` bytes remain.
pub(crate) const fn ensure_remaining(buf: &[u8], need: usize) -> CodecResult<()> {
    if buf.len() < need {
        return Err(CodecError::InsufficientData {
            need,
            have: buf.len(),
        });
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut &[u8]) -> CodecResult<u8> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_u32(buf: &mut &[u8]) -> CodecResult<u32> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_u32_le())
}

pub(crate) fn get_u64(buf: &mut &[u8]) -> CodecResult<u64> {
    ensure_remaining(buf, 8)?;
    Ok(buf.get_u64_le())
}

pub(crate) fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

pub(crate) fn get_bool(buf: &mut &[u8], field: &'static str) -> CodecResult<bool> {
    match get_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(CodecError::InvalidValue { field, value }),
    }
}

pub(crate) fn put_page(buf: &mut BytesMut, page: PageId) {
    buf.put_u64_le(page.get());
}

pub(crate) fn get_page(buf: &mut &[u8]) -> CodecResult<PageId> {
    get_u64(buf).map(PageId::new)
}

pub(crate) fn put_group(buf: &mut BytesMut, group: SubscriberGroupId) {
    buf.put_u64_le(group.get());
}

pub(crate) fn get_group(buf: &mut &[u8]) -> CodecResult<SubscriberGroupId> {
    get_u64(buf).map(SubscriberGroupId::new)
}

pub(crate) fn put_position(buf: &mut BytesMut, position: Position) {
    buf.put_u64_le(position.page.get());
    buf.put_u32_le(position.offset);
}

pub(crate) fn get_position(buf: &mut &[u8]) -> CodecResult<Position> {
    ensure_remaining(buf, 12)?;
    let page = PageId::new(buf.get_u64_le());
    let offset = buf.get_u32_le();
    Ok(Position::new(page, offset))
}

pub(crate) fn put_optional<T>(buf: &mut BytesMut, value: Option<T>, put: impl FnOnce(&mut BytesMut, T)) {
    match value {
        Some(value) => {
            buf.put_u8(1);
            put(buf, value);
        }
        None => buf.put_u8(0),
    }
}

pub(crate) fn get_optional<T>(
    buf: &mut &[u8],
    field: &'static str,
    get: impl FnOnce(&mut &[u8]) -> CodecResult<T>,
) -> CodecResult<Option<T>> {
    if get_bool(buf, field)? {
        get(buf).map(Some)
    } else {
        Ok(None)
    }
}

/// Writes a count. Collections are bounded by partition limits well below
/// `u32::MAX`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn put_count(buf: &mut BytesMut, count: usize) {
    buf.put_u32_le(count as u32);
}

pub(crate) fn put_bytes(buf: &mut BytesMut, value: &Bytes) {
    put_count(buf, value.len());
    buf.put_slice(value);
}

pub(crate) fn get_bytes(buf: &mut &[u8]) -> CodecResult<Bytes> {
    let len = get_u32(buf)? as usize;
    ensure_remaining(buf, len)?;
    let value = Bytes::copy_from_slice(&buf[..len]);
    buf.advance(len);
    Ok(value)
}

pub(crate) fn put_element(buf: &mut BytesMut, element: &Element) {
    put_position(buf, element.position);
    put_bytes(buf, &element.value);
}

pub(crate) fn get_element(buf: &mut &[u8]) -> CodecResult<Element> {
    let position = get_position(buf)?;
    let value = get_bytes(buf)?;
    Ok(Element::new(position, value))
}
