//! Command dispatch.
//!
//! A write first consumes the connection's challenge, so one challenge can
//! never power two attempts, then decodes the frame and runs the handler for
//! its opcode. Handlers check their payload length, authenticate, apply
//! preconditions and only then change state. A rejected write changes
//! nothing except key recency and the consumed challenge, and produces no
//! response.

use fmdn_crypto::{CryptoProvider, IdentityKey, KeyPurpose, verify_current_key_hash};
use fmdn_proto::{
    CommandFrame, IDENTITY_KEY_SIZE, KEY_HASH_SIZE, NONCE_SIZE, Opcode, ProtocolError,
    ResponseFrame,
    payloads::{
        ActivateTrackingProtectionRequest, BeaconParameters, ClearIdentityKeyRequest,
        DeactivateTrackingProtectionRequest, ProvisioningState, RingRequest,
        SetIdentityKeyRequest, expect_empty,
    },
};
use zeroize::Zeroize;

use super::{Accessory, AccessoryAction};
use crate::{
    auth::{SignedRequest, find_key_by_tag, purpose_key, signed_response, verify_purpose},
    connection::ConnectionId,
    env::Environment,
    error::{AuthFailure, DispatchError},
    identity::ProvisionOutcome,
    key_store::AccountKey,
    platform::Platform,
    ring::RingContext,
    storage::Storage,
};

type Handled = Result<ResponseFrame, DispatchError>;

impl<E, S, C, P> Accessory<E, S, C, P>
where
    E: Environment,
    S: Storage,
    C: CryptoProvider,
    P: Platform,
{
    /// Transport write: authenticate and execute one command.
    ///
    /// On success the first action is the tagged response, notified on the
    /// same connection; further actions are side effects.
    ///
    /// # Errors
    ///
    /// Any [`DispatchError`]; its [`DispatchError::code`] is the error the
    /// transport reports for the write.
    pub fn write_command(
        &mut self,
        connection: ConnectionId,
        bytes: &[u8],
    ) -> Result<Vec<AccessoryAction>, DispatchError> {
        let opcode = bytes.first().copied();
        let result = self.dispatch(connection, bytes);

        match &result {
            Ok(actions) => {
                tracing::debug!(%connection, ?opcode, actions = actions.len(), "command handled");
            },
            Err(e) if e.is_peer_fault() => {
                tracing::warn!(%connection, ?opcode, code = ?e.code(), error = %e, "command rejected");
            },
            Err(e) => {
                tracing::error!(%connection, ?opcode, error = %e, "command failed");
            },
        }
        result
    }

    fn dispatch(
        &mut self,
        connection: ConnectionId,
        bytes: &[u8],
    ) -> Result<Vec<AccessoryAction>, DispatchError> {
        let nonce = self.connections.consume(connection)?;

        let frame = CommandFrame::decode(bytes)?;
        let opcode = frame.opcode_enum().ok_or(ProtocolError::UnknownOpcode(frame.opcode()))?;
        let request = SignedRequest::parse(&nonce, &frame)?;

        let mut actions = Vec::new();
        let response = match opcode {
            Opcode::ReadParameters => self.read_parameters(&request, &mut actions),
            Opcode::ReadProvisioningState => self.read_provisioning_state(&request),
            Opcode::SetIdentityKey => self.set_identity_key(&request, &mut actions),
            Opcode::ClearIdentityKey => self.clear_identity_key(&request, &mut actions),
            Opcode::ReadIdentityKey => self.read_identity_key(&request),
            Opcode::Ring => self.ring_request(connection, &request, &mut actions),
            Opcode::ReadRingState => self.read_ring_state(&request),
            Opcode::ActivateTrackingProtection => self.activate_utp(&request, &mut actions),
            Opcode::DeactivateTrackingProtection => self.deactivate_utp(&request, &mut actions),
        }?;

        let frame = response.encode()?;
        actions.insert(0, AccessoryAction::Notify { connection, frame });
        self.track_advertising(&actions);
        Ok(actions)
    }

    fn read_parameters(
        &mut self,
        request: &SignedRequest<'_>,
        actions: &mut Vec<AccessoryAction>,
    ) -> Handled {
        expect_empty(Opcode::ReadParameters, request.additional())?;
        let key = find_key_by_tag(&mut self.keys, request)?;

        let parameters = BeaconParameters {
            tx_power: self.config.calibrated_tx_power,
            clock: self.clock.now_secs(self.env.now()),
            curve: self.config.curve,
            ring_components: self.config.ring_components,
            ring_capabilities: if self.config.volume_control {
                BeaconParameters::CAPABILITY_VOLUME
            } else {
                0
            },
        };
        let mut block = parameters.to_block();
        self.crypto.aes128_ecb_encrypt(key.as_bytes(), &mut block)?;

        actions.push(AccessoryAction::ClockSynced);
        Ok(signed_response(key.as_bytes(), request.nonce(), Opcode::ReadParameters, block.to_vec())?)
    }

    fn read_provisioning_state(&mut self, request: &SignedRequest<'_>) -> Handled {
        expect_empty(Opcode::ReadProvisioningState, request.additional())?;
        let key = find_key_by_tag(&mut self.keys, request)?;

        let provisioned = self.identity.is_provisioned();
        let state = ProvisioningState {
            provisioned,
            owner: key.is_owner(),
            eid: self.identity.eid().filter(|_| provisioned).map(<[u8]>::to_vec),
        };
        Ok(signed_response(
            key.as_bytes(),
            request.nonce(),
            Opcode::ReadProvisioningState,
            state.encode()?,
        )?)
    }

    fn set_identity_key(
        &mut self,
        request: &SignedRequest<'_>,
        actions: &mut Vec<AccessoryAction>,
    ) -> Handled {
        let decoded =
            SetIdentityKeyRequest::decode(request.additional(), self.identity.is_provisioned())?;
        let key = self.owner_key(request)?;

        if let Some(hash) = &decoded.current_key_hash {
            self.check_current_key(request.nonce(), hash)?;
        }

        let mut plain: [u8; IDENTITY_KEY_SIZE] = decoded.encrypted_key;
        self.crypto.aes128_ecb_decrypt(key.as_bytes(), &mut plain)?;
        let identity_key = IdentityKey::new(plain);
        plain.zeroize();

        let now = self.env.now();
        let clock = self.clock.now_secs(now);
        let (outcome, advertisement) = self.identity.provision(
            identity_key,
            clock,
            &self.crypto,
            self.platform.battery_level(),
        )?;

        actions.push(advertisement.into());
        if outcome == ProvisionOutcome::Provisioned {
            actions.push(AccessoryAction::ProvisioningChanged { provisioned: true });
        }
        self.schedule_rotation(now);

        Ok(signed_response(key.as_bytes(), request.nonce(), Opcode::SetIdentityKey, Vec::new())?)
    }

    fn clear_identity_key(
        &mut self,
        request: &SignedRequest<'_>,
        actions: &mut Vec<AccessoryAction>,
    ) -> Handled {
        let decoded = ClearIdentityKeyRequest::decode(request.additional())?;
        let key = self.owner_key(request)?;
        self.check_current_key(request.nonce(), &decoded.current_key_hash)?;

        self.unprovision(actions);
        Ok(signed_response(key.as_bytes(), request.nonce(), Opcode::ClearIdentityKey, Vec::new())?)
    }

    fn read_identity_key(&mut self, request: &SignedRequest<'_>) -> Handled {
        expect_empty(Opcode::ReadIdentityKey, request.additional())?;
        let recovery = verify_purpose(self.identity.identity_key(), KeyPurpose::Recovery, request)?;

        if !self.platform.user_consent_granted() {
            return Err(DispatchError::NoUserConsent);
        }

        let owner = self.keys.owner().ok_or(AuthFailure::NotOwner)?;
        let identity_key = self.identity.identity_key().ok_or(AuthFailure::NotProvisioned)?;

        let mut encrypted = *identity_key.as_bytes();
        let encrypted_result = self.crypto.aes128_ecb_encrypt(owner.as_bytes(), &mut encrypted);
        if let Err(e) = encrypted_result {
            encrypted.zeroize();
            return Err(e.into());
        }

        tracing::info!("identity key read out with user consent");
        Ok(signed_response(
            recovery.as_bytes(),
            request.nonce(),
            Opcode::ReadIdentityKey,
            encrypted.to_vec(),
        )?)
    }

    fn ring_request(
        &mut self,
        connection: ConnectionId,
        request: &SignedRequest<'_>,
        actions: &mut Vec<AccessoryAction>,
    ) -> Handled {
        let decoded = RingRequest::decode(request.additional())?;

        let key = if self.identity.utp().skip_ring_auth() {
            tracing::debug!(%connection, "ring authentication skipped by tracking protection");
            purpose_key(self.identity.identity_key(), KeyPurpose::Ring)?
        } else {
            let key = verify_purpose(self.identity.identity_key(), KeyPurpose::Ring, request)?;
            if self.ring.exceeds_capability(decoded.components) {
                return Err(AuthFailure::ComponentsExceedCapability.into());
            }
            key
        };

        let command = self.ring.validate(&decoded)?;
        let transition = self.ring.apply(command, self.env.now());
        if let Some(sound) = transition.sound {
            actions.push(sound.into());
        }
        actions.push(AccessoryAction::RingStateChanged(transition.change));
        self.ring.set_context(RingContext { connection, nonce: *request.nonce() });

        Ok(signed_response(
            key.as_bytes(),
            request.nonce(),
            Opcode::Ring,
            transition.change.encode().to_vec(),
        )?)
    }

    fn read_ring_state(&mut self, request: &SignedRequest<'_>) -> Handled {
        expect_empty(Opcode::ReadRingState, request.additional())?;
        let key = verify_purpose(self.identity.identity_key(), KeyPurpose::Ring, request)?;

        let status = self.ring.status(self.env.now()).encode();
        Ok(signed_response(key.as_bytes(), request.nonce(), Opcode::ReadRingState, status.to_vec())?)
    }

    fn activate_utp(
        &mut self,
        request: &SignedRequest<'_>,
        actions: &mut Vec<AccessoryAction>,
    ) -> Handled {
        let decoded = ActivateTrackingProtectionRequest::decode(request.additional())?;
        let key =
            verify_purpose(self.identity.identity_key(), KeyPurpose::TrackingProtection, request)?;

        let clock = self.clock.now_secs(self.env.now());
        let advertisement = self.identity.activate_utp(
            decoded.control_flags,
            clock,
            &self.crypto,
            self.platform.battery_level(),
        )?;
        actions.extend(advertisement.map(AccessoryAction::from));

        Ok(signed_response(
            key.as_bytes(),
            request.nonce(),
            Opcode::ActivateTrackingProtection,
            Vec::new(),
        )?)
    }

    fn deactivate_utp(
        &mut self,
        request: &SignedRequest<'_>,
        actions: &mut Vec<AccessoryAction>,
    ) -> Handled {
        let decoded = DeactivateTrackingProtectionRequest::decode(request.additional())?;
        let key =
            verify_purpose(self.identity.identity_key(), KeyPurpose::TrackingProtection, request)?;
        self.check_current_key(request.nonce(), &decoded.current_key_hash)?;

        let clock = self.clock.now_secs(self.env.now());
        let advertisement =
            self.identity.deactivate_utp(clock, &self.crypto, self.platform.battery_level())?;
        actions.extend(advertisement.map(AccessoryAction::from));

        Ok(signed_response(
            key.as_bytes(),
            request.nonce(),
            Opcode::DeactivateTrackingProtection,
            Vec::new(),
        )?)
    }

    /// Match the tag against stored keys and require the owner key. Recency
    /// is bumped by the match even when the owner check then fails.
    fn owner_key(&mut self, request: &SignedRequest<'_>) -> Result<AccountKey, DispatchError> {
        let key = find_key_by_tag(&mut self.keys, request)?;
        if !key.is_owner() {
            return Err(AuthFailure::NotOwner.into());
        }
        Ok(key)
    }

    /// Require proof of the current identity key.
    fn check_current_key(
        &self,
        nonce: &[u8; NONCE_SIZE],
        hash: &[u8; KEY_HASH_SIZE],
    ) -> Result<(), DispatchError> {
        let identity_key = self.identity.identity_key().ok_or(AuthFailure::NotProvisioned)?;
        if verify_current_key_hash(identity_key, nonce, hash) {
            Ok(())
        } else {
            Err(AuthFailure::KeyHashMismatch.into())
        }
    }
}
