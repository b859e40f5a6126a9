use curve25519_dalek::scalar::Scalar;
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

use crate::{
    AggsigError, Counterparty, KernelContext, KernelMessage, PartialSignature, Signature, Signer,
    VerificationKey,
};

const MESSAGE: KernelMessage = KernelMessage {
    fee: 8_000_000,
    lock_height: 0,
};

fn two_signers() -> (Signer, Signer) {
    let mut rng = ChaChaRng::from_seed([7u8; 32]);
    (
        Signer::new(Scalar::random(&mut rng)),
        Signer::new(Scalar::random(&mut rng)),
    )
}

fn context_for(message: KernelMessage, signers: &[&Signer]) -> KernelContext {
    let nonces: Vec<_> = signers.iter().map(|s| s.public_nonce()).collect();
    let keys: Vec<_> = signers.iter().map(|s| s.public_excess()).collect();
    KernelContext::new(message, &nonces, &keys).unwrap()
}

#[test]
fn two_party_kernel_signature_verifies() {
    let (sender, receiver) = two_signers();
    let context = context_for(MESSAGE, &[&sender, &receiver]);

    let shares = vec![sender.sign(&context), receiver.sign(&context)];
    let sig = Signature::aggregate(&context, &shares).unwrap();

    assert!(sig.verify(&context).is_ok());
    assert!(sig.verify_kernel(MESSAGE, &context.key_sum()).is_ok());
}

#[test]
fn wrong_message_fails() {
    let (sender, receiver) = two_signers();
    let context = context_for(MESSAGE, &[&sender, &receiver]);
    let shares = vec![sender.sign(&context), receiver.sign(&context)];
    let sig = Signature::aggregate(&context, &shares).unwrap();

    let other = KernelMessage {
        fee: MESSAGE.fee + 1,
        lock_height: 0,
    };
    assert_eq!(
        sig.verify_kernel(other, &context.key_sum()),
        Err(AggsigError::InvalidSignature)
    );
}

#[test]
fn restored_signer_signs_identically() {
    let (sender, receiver) = two_signers();
    let restored = Signer::from_secrets(*sender.secret_excess(), *sender.secret_nonce());
    let context = context_for(MESSAGE, &[&sender, &receiver]);

    assert_eq!(sender.public_nonce(), restored.public_nonce());
    assert_eq!(sender.sign(&context), restored.sign(&context));
}

#[test]
fn counterparty_share_check() {
    let (sender, receiver) = two_signers();
    let context = context_for(MESSAGE, &[&sender, &receiver]);
    let cp = Counterparty::new(receiver.public_nonce(), receiver.public_excess());

    let good = receiver.sign(&context);
    assert!(cp.verify_share(&good, &context).is_ok());

    let bad = PartialSignature(good.0 + Scalar::one());
    assert_eq!(
        cp.verify_share(&bad, &context),
        Err(AggsigError::ShareError {
            pubkey: *receiver.public_excess().as_bytes()
        })
    );

    // a share from the wrong participant
    let sender_share = sender.sign(&context);
    assert!(cp.verify_share(&sender_share, &context).is_err());
}

#[test]
fn tampered_aggregate_fails() {
    let (sender, receiver) = two_signers();
    let context = context_for(MESSAGE, &[&sender, &receiver]);
    let shares = vec![sender.sign(&context), receiver.sign(&context)];
    let mut sig = Signature::aggregate(&context, &shares).unwrap();
    sig.s += Scalar::one();
    assert!(sig.verify(&context).is_err());
}

#[test]
fn empty_context_rejected() {
    assert_eq!(
        KernelContext::new(MESSAGE, &[], &[]).unwrap_err(),
        AggsigError::BadArguments
    );
    let key = VerificationKey::from_secret(&Scalar::one());
    assert_eq!(
        KernelContext::new(MESSAGE, &[key], &[]).unwrap_err(),
        AggsigError::BadArguments
    );
}

#[test]
fn message_signature() {
    let privkey = Scalar::from(42u64);
    let pubkey = VerificationKey::from_secret(&privkey);
    let sig = Signature::sign_message(b"participant", b"hello", &privkey);

    assert!(sig.verify_message(b"participant", b"hello", &pubkey).is_ok());
    assert!(sig.verify_message(b"participant", b"hullo", &pubkey).is_err());
    assert!(sig.verify_message(b"other", b"hello", &pubkey).is_err());

    let other = VerificationKey::from_secret(&Scalar::from(43u64));
    assert!(sig.verify_message(b"participant", b"hello", &other).is_err());
}

#[test]
fn json_uses_hex() {
    let key = VerificationKey::from_secret(&Scalar::from(5u64));
    let json = serde_json::to_string(&key).unwrap();
    assert_eq!(json, format!("\"{}\"", hex::encode(key.as_bytes())));
    let back: VerificationKey = serde_json::from_str(&json).unwrap();
    assert_eq!(back, key);

    let sig = Signature::sign_message(b"test", b"msg", &Scalar::from(5u64));
    let json = serde_json::to_string(&sig).unwrap();
    assert_eq!(json.len(), 2 + 128);
    let back: Signature = serde_json::from_str(&json).unwrap();
    assert_eq!(back, sig);
}

#[test]
fn bincode_uses_bytes() {
    let share = PartialSignature(Scalar::from(99u64));
    let encoded = bincode::serialize(&share).unwrap();
    // u64 length prefix plus 32 bytes
    assert_eq!(encoded.len(), 8 + 32);
    let back: PartialSignature = bincode::deserialize(&encoded).unwrap();
    assert_eq!(back, share);
}

#[test]
fn non_canonical_partial_rejected() {
    let err = serde_json::from_str::<PartialSignature>(&format!("\"{}\"", "ff".repeat(32)));
    assert!(err.is_err());
}
