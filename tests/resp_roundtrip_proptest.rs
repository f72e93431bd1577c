// tests/resp_roundtrip_proptest.rs

//! Property test for the universal RESP invariant: decode(encode(x)) = x for
//! every representable value, including bulk strings with embedded CR/LF.

use proptest::prelude::*;
use spineldb::core::protocol::RespFrame;
use spineldb::core::protocol::resp_frame::try_parse;

fn arb_leaf() -> impl Strategy<Value = RespFrame> {
    prop_oneof![
        "[^\r\n]{0,32}".prop_map(RespFrame::SimpleString),
        "[^\r\n]{0,32}".prop_map(RespFrame::Error),
        any::<i64>().prop_map(RespFrame::Integer),
        proptest::collection::vec(any::<u8>(), 0..64)
            .prop_map(|b| RespFrame::BulkString(b.into())),
        Just(RespFrame::Null),
        Just(RespFrame::NullArray),
    ]
}

fn arb_frame() -> impl Strategy<Value = RespFrame> {
    arb_leaf().prop_recursive(3, 32, 4, |inner| {
        proptest::collection::vec(inner, 0..4).prop_map(RespFrame::Array)
    })
}

proptest! {
    #[test]
    fn roundtrips_through_the_wire(frame in arb_frame()) {
        let encoded = frame.encode_to_vec();
        let (decoded, consumed) = try_parse(&encoded)
            .expect("well-formed frame must parse")
            .expect("a fully-encoded frame must not be reported as incomplete");
        prop_assert_eq!(consumed, encoded.len());
        prop_assert_eq!(decoded, frame);
    }
}
