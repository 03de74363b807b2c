//! Tag identifiers and the inbound record shape the reader delivers.
//!
//! `TagId` is a closed set: it mirrors the accelerator's shared-memory
//! tag vocabulary referenced by the formatter letter table in
//! [`crate::letters`]. Real deployments bind these to the accelerator's
//! own numeric tag ids at startup; within this workspace the enum
//! itself is the stable identifier.

/// Originator side a tag record came from. A handler's `origin` field
/// is an OR of these bits; `ANY` matches either side.
pub mod origin {
    pub const CLIENT: u8 = 0b01;
    pub const BACKEND: u8 = 0b10;
    pub const ANY: u8 = CLIENT | BACKEND;
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagId {
    Length = 0,
    RxProtocol = 1,
    TxProtocol = 2,
    ReqStart = 3,
    BackendOpen = 4,
    RxHeader = 5,
    TxHeader = 6,
    RxRequest = 7,
    TxRequest = 8,
    RxStatus = 9,
    TxStatus = 10,
    ReqEnd = 11,
    Url = 12,
    VclCall = 13,
    VclLog = 14,
}

pub const TAG_COUNT: usize = 15;

impl TagId {
    pub const ALL: [TagId; TAG_COUNT] = [
        TagId::Length,
        TagId::RxProtocol,
        TagId::TxProtocol,
        TagId::ReqStart,
        TagId::BackendOpen,
        TagId::RxHeader,
        TagId::TxHeader,
        TagId::RxRequest,
        TagId::TxRequest,
        TagId::RxStatus,
        TagId::TxStatus,
        TagId::ReqEnd,
        TagId::Url,
        TagId::VclCall,
        TagId::VclLog,
    ];

    pub fn index(self) -> usize {
        self as u8 as usize
    }
}

/// The distinguished tag whose arrival completes a transaction (§3, §4.6).
pub const END_OF_TRANSACTION: TagId = TagId::ReqEnd;

/// A single (tagId, bytes) record as delivered by the reader. Bytes are
/// borrowed for the duration of the callback only (§3 "Captured slice
/// ownership").
#[derive(Debug, Clone, Copy)]
pub struct TagRecord<'a> {
    pub tag: TagId,
    pub tx_id: u32,
    pub origin: u8,
    pub bytes: &'a [u8],
    pub seen_bitmap: u64,
}

impl<'a> TagRecord<'a> {
    pub fn new(tag: TagId, tx_id: u32, origin: u8, bytes: &'a [u8], seen_bitmap: u64) -> Self {
        Self {
            tag,
            tx_id,
            origin,
            bytes,
            seen_bitmap,
        }
    }
}
