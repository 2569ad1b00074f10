// This file is part of Astarte.
//
// Copyright 2025, 2026 SECO Mind Srl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Key derivation functions.

use std::num::NonZeroU32;

use aws_lc_rs::{hmac, pbkdf2};
use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::error::ErrorKind;
use iotsec_provisioning_protocol::oic::cred::KeyMaterial;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Iterations used to stretch the PIN.
pub(crate) const PIN_ITERATIONS: u32 = 1000;

/// Length of the PSK derived from the PIN.
pub(crate) const PIN_PSK_LEN: usize = 16;

/// KDF in Counter Mode with HMAC-SHA256 as PRF.
///
/// The counter `i` and the output length `L` in bits are both encoded as 32 bit big endian
/// integers (r = 32).
///
/// https://nvlpubs.nist.gov/nistpubs/SpecialPublications/NIST.SP.800-108r1-upd1.pdf
pub(crate) fn kdf_ctr_hmac_sha256(
    // K_IN
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    len: usize,
) -> Result<KeyMaterial, Error> {
    if len == 0 {
        return Err(Error::new(ErrorKind::Validation, "zero length key"));
    }

    let l_bits = len
        .checked_mul(8)
        .and_then(|bits| u32::try_from(bits).ok())
        .ok_or(Error::new(
            ErrorKind::Crypto,
            "output len cannot fit in counter type",
        ))?;

    let h_out_bytes = hmac::HMAC_SHA256.digest_algorithm().output_len;

    // NIST.SP.800-108r1-upd1: Step 1, Step 2
    let n = u32::try_from(len.div_ceil(h_out_bytes)).map_err(|_| {
        Error::new(
            ErrorKind::Crypto,
            "iterations cannot be fitted in counter type",
        )
    })?;

    let k_in = hmac::Key::new(hmac::HMAC_SHA256, secret);

    let mut output = Zeroizing::new(Vec::with_capacity(len));
    for i in 1..=n {
        // NIST.SP.800-108r1-upd1: Step 4a:
        // K(i) := PRF(K_IN, [i]_2 || Label || 0x00 || Context || [L]_2)
        let mut prf = hmac::Context::with_key(&k_in);
        prf.update(&i.to_be_bytes());
        prf.update(label);
        prf.update(&[0x00]);
        prf.update(context);
        prf.update(&l_bits.to_be_bytes());
        let k_i = prf.sign();

        // NIST.SP.800-108r1-upd1: Step 4b, Step 5
        let rem = len.saturating_sub(output.len()).min(h_out_bytes);
        output.extend_from_slice(&k_i.as_ref()[..rem]);
    }

    debug_assert_eq!(output.len(), len);

    Ok(KeyMaterial::new(output))
}

/// PSK used to authenticate the session of the random PIN method.
///
/// PBKDF2-HMAC-SHA256 over the PIN, salted with the device UUID.
pub(crate) fn pin_psk(pin: &str, device: &Uuid) -> Result<KeyMaterial, Error> {
    let iterations = NonZeroU32::new(PIN_ITERATIONS)
        .ok_or(Error::new(ErrorKind::Crypto, "pin iterations"))?;

    let mut psk = Zeroizing::new(vec![0u8; PIN_PSK_LEN]);

    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        device.as_bytes(),
        pin.as_bytes(),
        psk.as_mut_slice(),
    );

    Ok(KeyMaterial::new(psk))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::{assert_eq, assert_ne};

    use super::*;

    #[test]
    fn kdf_output_lengths() {
        for len in [1, 16, 32, 33, 64, 100] {
            let key = kdf_ctr_hmac_sha256(b"secret", b"label", b"context", len).unwrap();

            assert_eq!(key.len(), len);
        }
    }

    #[test]
    fn kdf_binds_every_input() {
        let key = kdf_ctr_hmac_sha256(b"secret", b"label", b"context", 32).unwrap();

        let other_secret = kdf_ctr_hmac_sha256(b"secreT", b"label", b"context", 32).unwrap();
        let other_label = kdf_ctr_hmac_sha256(b"secret", b"labeL", b"context", 32).unwrap();
        let other_context = kdf_ctr_hmac_sha256(b"secret", b"label", b"contexT", 32).unwrap();

        assert_ne!(key, other_secret);
        assert_ne!(key, other_label);
        assert_ne!(key, other_context);

        // The length is part of the PRF input, a shorter key is not a prefix.
        let short = kdf_ctr_hmac_sha256(b"secret", b"label", b"context", 16).unwrap();
        assert_ne!(short.expose(), &key.expose()[..16]);
    }

    #[test]
    fn kdf_zero_len() {
        let err = kdf_ctr_hmac_sha256(b"secret", b"label", b"context", 0).unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn pin_psk_is_salted_by_device() {
        let a = pin_psk("12345678", &Uuid::from_u128(1)).unwrap();
        let b = pin_psk("12345678", &Uuid::from_u128(2)).unwrap();

        assert_eq!(a.len(), PIN_PSK_LEN);
        assert_ne!(a, b);
        assert_eq!(a, pin_psk("12345678", &Uuid::from_u128(1)).unwrap());
    }
}
