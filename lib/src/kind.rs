// Copyright (c) 2022-2023 The MobileCoin Foundation

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::{Display, EnumIter, EnumString};

/// Supported flows, discriminants match the host integer encoding
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    TryFromPrimitive,
    IntoPrimitive,
    clap::ValueEnum,
)]
#[repr(i32)]
#[strum(serialize_all = "kebab-case")]
pub enum OperationKind {
    GetAppInfo = 0,
    RecoverAccount = 1,
    LoadAccount = 2,
    Login = 3,
    ExportPublic = 4,
    Sign = 5,
    #[strum(serialize = "change-pin")]
    ChangePIN = 6,
    #[strum(serialize = "change-puk")]
    ChangePUK = 7,
    ChangePairing = 8,
    StoreMetadata = 12,
    GetMetadata = 13,
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn integer_and_string_forms() {
        for k in OperationKind::iter() {
            let i: i32 = k.into();
            assert_eq!(OperationKind::try_from(i).ok(), Some(k));
            assert_eq!(OperationKind::from_str(&k.to_string()).ok(), Some(k));
        }

        assert_eq!(OperationKind::ChangePIN.to_string(), "change-pin");
        assert!(OperationKind::try_from(9).is_err());
    }
}
