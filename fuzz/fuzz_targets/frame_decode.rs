//! Fuzz target for frame and payload decoding
//!
//! Feeds arbitrary bytes to every decoder a peer can reach:
//! - Command, response and challenge frames
//! - Every request payload, with and without provisioning
//! - Response bodies a peer-side decoder would parse
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use fmdn_proto::{
    Challenge, CommandFrame, ResponseFrame,
    payloads::{
        ActivateTrackingProtectionRequest, ClearIdentityKeyRequest,
        DeactivateTrackingProtectionRequest, ProvisioningState, RingRequest, RingStateChange,
        RingStatus, SetIdentityKeyRequest,
    },
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = CommandFrame::decode(data) {
        // A frame that decodes must re-encode to the same bytes
        assert_eq!(frame.encode().as_ref(), data);
        let _ = frame.split_tag();
    }
    let _ = ResponseFrame::decode(data);
    let _ = Challenge::decode(data);

    let _ = SetIdentityKeyRequest::decode(data, false);
    let _ = SetIdentityKeyRequest::decode(data, true);
    let _ = ClearIdentityKeyRequest::decode(data);
    let _ = RingRequest::decode(data);
    let _ = ActivateTrackingProtectionRequest::decode(data);
    let _ = DeactivateTrackingProtectionRequest::decode(data);

    let _ = ProvisioningState::decode(data);
    let _ = RingStateChange::decode(data);
    let _ = RingStatus::decode(data);
});
