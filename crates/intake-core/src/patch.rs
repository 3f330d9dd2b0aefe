//! Partial attribute sets sent by clients.
//!
//! A patch tells a key that was left out apart from a key sent as `null`.
//! Left-out keys keep their stored value, `null` clears it. Each field is
//! `None` when absent and `Some(value)` when present, `Some(None)` being an
//! explicit null.

use serde::{Deserialize, Deserializer};

use crate::model::{ApplicationAttributes, MemberAttributes, VehicleAttributes};

/// Wraps a present field, `null` included, in `Some`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn merge<T: Clone>(slot: &mut Option<T>, value: &Option<Option<T>>) {
    if let Some(value) = value {
        *slot = value.clone();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPatch {
    #[serde(default, deserialize_with = "present")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub city: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub confirmation_code: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    pub number_of_bedrooms: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    pub phone_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub state: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub zip: Option<Option<String>>,
}

impl ApplicationPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Writes the present keys over `attributes`.
    pub fn apply(&self, attributes: &mut ApplicationAttributes) {
        merge(&mut attributes.address, &self.address);
        merge(&mut attributes.city, &self.city);
        merge(&mut attributes.confirmation_code, &self.confirmation_code);
        merge(&mut attributes.number_of_bedrooms, &self.number_of_bedrooms);
        merge(&mut attributes.phone_number, &self.phone_number);
        merge(&mut attributes.state, &self.state);
        merge(&mut attributes.zip, &self.zip);
    }

    /// The attributes of a record created from this patch.
    pub fn to_attributes(&self) -> ApplicationAttributes {
        let mut attributes = ApplicationAttributes::default();
        self.apply(&mut attributes);
        attributes
    }
}

impl From<ApplicationAttributes> for ApplicationPatch {
    /// A patch that sets every key.
    fn from(attributes: ApplicationAttributes) -> Self {
        Self {
            address: Some(attributes.address),
            city: Some(attributes.city),
            confirmation_code: Some(attributes.confirmation_code),
            number_of_bedrooms: Some(attributes.number_of_bedrooms),
            phone_number: Some(attributes.phone_number),
            state: Some(attributes.state),
            zip: Some(attributes.zip),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MemberPatch {
    #[serde(default, deserialize_with = "present")]
    pub age: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub gender: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub first: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub last: Option<Option<String>>,
}

impl MemberPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, attributes: &mut MemberAttributes) {
        merge(&mut attributes.age, &self.age);
        merge(&mut attributes.email, &self.email);
        merge(&mut attributes.gender, &self.gender);
        merge(&mut attributes.first, &self.first);
        merge(&mut attributes.last, &self.last);
    }

    pub fn to_attributes(&self) -> MemberAttributes {
        let mut attributes = MemberAttributes::default();
        self.apply(&mut attributes);
        attributes
    }
}

impl From<MemberAttributes> for MemberPatch {
    fn from(attributes: MemberAttributes) -> Self {
        Self {
            age: Some(attributes.age),
            email: Some(attributes.email),
            gender: Some(attributes.gender),
            first: Some(attributes.first),
            last: Some(attributes.last),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePatch {
    #[serde(default, deserialize_with = "present")]
    pub license_plate: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub make: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub model: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub year: Option<Option<i32>>,
}

impl VehiclePatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, attributes: &mut VehicleAttributes) {
        merge(&mut attributes.license_plate, &self.license_plate);
        merge(&mut attributes.make, &self.make);
        merge(&mut attributes.model, &self.model);
        merge(&mut attributes.year, &self.year);
    }

    pub fn to_attributes(&self) -> VehicleAttributes {
        let mut attributes = VehicleAttributes::default();
        self.apply(&mut attributes);
        attributes
    }
}

impl From<VehicleAttributes> for VehiclePatch {
    fn from(attributes: VehicleAttributes) -> Self {
        Self {
            license_plate: Some(attributes.license_plate),
            make: Some(attributes.make),
            model: Some(attributes.model),
            year: Some(attributes.year),
        }
    }
}
