/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tag numbers used by the session layer and common application messages.
//!
//! This is not a data dictionary: it names the header, trailer and
//! session-level tags the engine reads or writes, plus the order-entry tags
//! most applications touch first.

/// Account (1).
pub const ACCOUNT: u32 = 1;
/// AvgPx (6).
pub const AVG_PX: u32 = 6;
/// BeginSeqNo (7).
pub const BEGIN_SEQ_NO: u32 = 7;
/// BeginString (8).
pub const BEGIN_STRING: u32 = 8;
/// BodyLength (9).
pub const BODY_LENGTH: u32 = 9;
/// CheckSum (10).
pub const CHECK_SUM: u32 = 10;
/// ClOrdID (11).
pub const CL_ORD_ID: u32 = 11;
/// CumQty (14).
pub const CUM_QTY: u32 = 14;
/// Currency (15).
pub const CURRENCY: u32 = 15;
/// EndSeqNo (16).
pub const END_SEQ_NO: u32 = 16;
/// ExecID (17).
pub const EXEC_ID: u32 = 17;
/// HandlInst (21).
pub const HANDL_INST: u32 = 21;
/// SecurityIDSource (22).
pub const SECURITY_ID_SOURCE: u32 = 22;
/// MsgSeqNum (34).
pub const MSG_SEQ_NUM: u32 = 34;
/// MsgType (35).
pub const MSG_TYPE: u32 = 35;
/// NewSeqNo (36).
pub const NEW_SEQ_NO: u32 = 36;
/// OrderID (37).
pub const ORDER_ID: u32 = 37;
/// OrderQty (38).
pub const ORDER_QTY: u32 = 38;
/// OrdStatus (39).
pub const ORD_STATUS: u32 = 39;
/// OrdType (40).
pub const ORD_TYPE: u32 = 40;
/// PossDupFlag (43).
pub const POSS_DUP_FLAG: u32 = 43;
/// Price (44).
pub const PRICE: u32 = 44;
/// RefSeqNum (45).
pub const REF_SEQ_NUM: u32 = 45;
/// SecurityID (48).
pub const SECURITY_ID: u32 = 48;
/// SenderCompID (49).
pub const SENDER_COMP_ID: u32 = 49;
/// SenderSubID (50).
pub const SENDER_SUB_ID: u32 = 50;
/// SendingTime (52).
pub const SENDING_TIME: u32 = 52;
/// Side (54).
pub const SIDE: u32 = 54;
/// Symbol (55).
pub const SYMBOL: u32 = 55;
/// TargetCompID (56).
pub const TARGET_COMP_ID: u32 = 56;
/// TargetSubID (57).
pub const TARGET_SUB_ID: u32 = 57;
/// Text (58).
pub const TEXT: u32 = 58;
/// TransactTime (60).
pub const TRANSACT_TIME: u32 = 60;
/// PossResend (97).
pub const POSS_RESEND: u32 = 97;
/// EncryptMethod (98).
pub const ENCRYPT_METHOD: u32 = 98;
/// HeartBtInt (108).
pub const HEART_BT_INT: u32 = 108;
/// TestReqID (112).
pub const TEST_REQ_ID: u32 = 112;
/// OrigSendingTime (122).
pub const ORIG_SENDING_TIME: u32 = 122;
/// GapFillFlag (123).
pub const GAP_FILL_FLAG: u32 = 123;
/// ResetSeqNumFlag (141).
pub const RESET_SEQ_NUM_FLAG: u32 = 141;
/// ExecType (150).
pub const EXEC_TYPE: u32 = 150;
/// LeavesQty (151).
pub const LEAVES_QTY: u32 = 151;
/// RefTagID (371).
pub const REF_TAG_ID: u32 = 371;
/// RefMsgType (372).
pub const REF_MSG_TYPE: u32 = 372;
/// SessionRejectReason (373).
pub const SESSION_REJECT_REASON: u32 = 373;

/// Standard header tags, in the order they are written after MsgType.
pub const HEADER_TAGS: [u32; 9] = [
    SENDER_COMP_ID,
    TARGET_COMP_ID,
    MSG_SEQ_NUM,
    SENDER_SUB_ID,
    TARGET_SUB_ID,
    POSS_DUP_FLAG,
    POSS_RESEND,
    SENDING_TIME,
    ORIG_SENDING_TIME,
];

/// Tags the encoder generates itself and which a [`Message`](crate::Message) never stores.
pub const FRAMING_TAGS: [u32; 4] = [BEGIN_STRING, BODY_LENGTH, MSG_TYPE, CHECK_SUM];

/// Returns true if the tag belongs to the standard header.
#[inline]
#[must_use]
pub fn is_header_tag(tag: u32) -> bool {
    HEADER_TAGS.contains(&tag)
}

/// Returns the FIX field name for a known tag.
#[must_use]
pub fn tag_name(tag: u32) -> Option<&'static str> {
    Some(match tag {
        ACCOUNT => "Account",
        AVG_PX => "AvgPx",
        BEGIN_SEQ_NO => "BeginSeqNo",
        BEGIN_STRING => "BeginString",
        BODY_LENGTH => "BodyLength",
        CHECK_SUM => "CheckSum",
        CL_ORD_ID => "ClOrdID",
        CUM_QTY => "CumQty",
        CURRENCY => "Currency",
        END_SEQ_NO => "EndSeqNo",
        EXEC_ID => "ExecID",
        HANDL_INST => "HandlInst",
        SECURITY_ID_SOURCE => "SecurityIDSource",
        MSG_SEQ_NUM => "MsgSeqNum",
        MSG_TYPE => "MsgType",
        NEW_SEQ_NO => "NewSeqNo",
        ORDER_ID => "OrderID",
        ORDER_QTY => "OrderQty",
        ORD_STATUS => "OrdStatus",
        ORD_TYPE => "OrdType",
        POSS_DUP_FLAG => "PossDupFlag",
        PRICE => "Price",
        REF_SEQ_NUM => "RefSeqNum",
        SECURITY_ID => "SecurityID",
        SENDER_COMP_ID => "SenderCompID",
        SENDER_SUB_ID => "SenderSubID",
        SENDING_TIME => "SendingTime",
        SIDE => "Side",
        SYMBOL => "Symbol",
        TARGET_COMP_ID => "TargetCompID",
        TARGET_SUB_ID => "TargetSubID",
        TEXT => "Text",
        TRANSACT_TIME => "TransactTime",
        POSS_RESEND => "PossResend",
        ENCRYPT_METHOD => "EncryptMethod",
        HEART_BT_INT => "HeartBtInt",
        TEST_REQ_ID => "TestReqID",
        ORIG_SENDING_TIME => "OrigSendingTime",
        GAP_FILL_FLAG => "GapFillFlag",
        RESET_SEQ_NUM_FLAG => "ResetSeqNumFlag",
        EXEC_TYPE => "ExecType",
        LEAVES_QTY => "LeavesQty",
        REF_TAG_ID => "RefTagID",
        REF_MSG_TYPE => "RefMsgType",
        SESSION_REJECT_REASON => "SessionRejectReason",
        _ => return None,
    })
}

/// Returns the tag number for a known FIX field name.
#[must_use]
pub fn tag_by_name(name: &str) -> Option<u32> {
    (1..=SESSION_REJECT_REASON).find(|&tag| tag_name(tag) == Some(name))
}
