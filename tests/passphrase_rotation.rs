use derivault::config::{KdfParams, PasswordPolicy};
use derivault::derive::derive;
use derivault::error::CatalogError;
use derivault::models::{PassphraseEpoch, ServiceRecord};
use derivault::store;

fn test_kdf() -> KdfParams {
    KdfParams {
        m_cost: 64,
        t_cost: 1,
        p_cost: 1,
    }
}

#[test]
fn rotation_keeps_old_passwords_reachable_until_rederivation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.bin");
    let policy = PasswordPolicy::default();

    let (mut catalog, key) = store::create("first-passphrase", test_kdf()).unwrap();
    let mut record = ServiceRecord::new("mail");
    record.additional_info = "2024-01-01".to_string();
    catalog.upsert(record).unwrap();

    let before_rotation =
        derive("first-passphrase", catalog.get("mail").unwrap(), &policy, test_kdf()).unwrap();

    let key = store::rotate_passphrase(
        &mut catalog,
        &key,
        "first-passphrase",
        "second-passphrase",
        test_kdf(),
    )
    .unwrap();
    store::save(&path, &catalog, &key).unwrap();

    // Reload: the record is flagged, the old passphrase still validates
    // against the retained material and still reproduces the password.
    let (catalog, key) = store::load(&path, "second-passphrase").unwrap();
    let mail = catalog.get("mail").unwrap();
    assert_eq!(mail.passphrase_epoch, PassphraseEpoch::Previous);
    assert!(key.validate_previous("first-passphrase").unwrap());
    assert!(!key.validate_previous("second-passphrase").unwrap());

    let still_derivable = derive("first-passphrase", mail, &policy, test_kdf()).unwrap();
    assert_eq!(still_derivable, before_rotation);
}

#[test]
fn rederivation_moves_record_to_new_passphrase() {
    let policy = PasswordPolicy::default();
    let (mut catalog, key) = store::create("first-passphrase", test_kdf()).unwrap();
    let mut record = ServiceRecord::new("mail");
    record.additional_info = "2024-01-01".to_string();
    catalog.upsert(record).unwrap();
    let old_password =
        derive("first-passphrase", catalog.get("mail").unwrap(), &policy, test_kdf()).unwrap();

    let key = store::rotate_passphrase(
        &mut catalog,
        &key,
        "first-passphrase",
        "second-passphrase",
        test_kdf(),
    )
    .unwrap();

    let mut migrated = catalog.get("mail").unwrap().clone();
    migrated.use_current_passphrase();
    catalog.upsert(migrated).unwrap();

    let mail = catalog.get("mail").unwrap();
    assert_eq!(mail.passphrase_epoch, PassphraseEpoch::Current);
    let new_password = derive("second-passphrase", mail, &policy, test_kdf()).unwrap();
    assert_ne!(new_password, old_password);

    // All records migrated: the next rotation is allowed again.
    assert!(
        store::rotate_passphrase(
            &mut catalog,
            &key,
            "second-passphrase",
            "third-passphrase",
            test_kdf(),
        )
        .is_ok()
    );
}

#[test]
fn rotation_requires_the_current_passphrase() {
    let (mut catalog, key) = store::create("first-passphrase", test_kdf()).unwrap();
    catalog.upsert(ServiceRecord::new("mail")).unwrap();

    let result = store::rotate_passphrase(
        &mut catalog,
        &key,
        "guessed-wrong",
        "second-passphrase",
        test_kdf(),
    );
    assert!(matches!(result, Err(CatalogError::WrongPassphrase)));
    assert_eq!(
        catalog.get("mail").unwrap().passphrase_epoch,
        PassphraseEpoch::Current
    );
}

#[test]
fn tombstones_do_not_block_rotation() {
    let (mut catalog, key) = store::create("first-passphrase", test_kdf()).unwrap();
    catalog.upsert(ServiceRecord::new("gone")).unwrap();
    catalog.soft_delete("gone");

    let key = store::rotate_passphrase(
        &mut catalog,
        &key,
        "first-passphrase",
        "second-passphrase",
        test_kdf(),
    )
    .unwrap();

    // The tombstone stays on the current epoch and a further rotation is
    // not blocked by it.
    assert!(
        store::rotate_passphrase(
            &mut catalog,
            &key,
            "second-passphrase",
            "third-passphrase",
            test_kdf(),
        )
        .is_ok()
    );
}
