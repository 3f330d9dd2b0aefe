//! Record trees returned by the store.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use intake_core::{Application, Member, RecordId, Vehicle};

/// An application together with its live members and vehicles.
///
/// Serializes in the nested form (`{...application, members, vehicles}`)
/// used by the listing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationTree {
    #[serde(flatten)]
    pub application: Application,
    pub members: Vec<Member>,
    pub vehicles: Vec<Vehicle>,
}

impl ApplicationTree {
    /// Returns the application id.
    pub fn id(&self) -> RecordId {
        self.application.id
    }

    /// Looks up a live member by id.
    pub fn member(&self, id: RecordId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Looks up a live vehicle by id.
    pub fn vehicle(&self, id: RecordId) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    /// Vehicles whose owner is not a live member of this application.
    pub fn orphaned_vehicles(&self) -> Vec<&Vehicle> {
        let member_ids: HashSet<RecordId> = self.members.iter().map(|m| m.id).collect();
        self.vehicles
            .iter()
            .filter(|v| !member_ids.contains(&v.owner_id))
            .collect()
    }

    /// Converts into the flat view handed back to clients after reconciliation.
    pub fn into_view(self) -> ApplicationView {
        ApplicationView {
            application: self.application,
            members: self.members,
            vehicles: self.vehicles,
        }
    }
}

/// The flat `{application, members, vehicles}` view of an application tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationView {
    pub application: Application,
    pub members: Vec<Member>,
    pub vehicles: Vec<Vehicle>,
}

impl From<ApplicationTree> for ApplicationView {
    fn from(tree: ApplicationTree) -> Self {
        tree.into_view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::{ApplicationAttributes, MemberAttributes, VehicleAttributes, now_utc};

    fn id(value: i64) -> RecordId {
        RecordId::new(value).unwrap()
    }

    fn tree() -> ApplicationTree {
        let now = now_utc();
        ApplicationTree {
            application: Application {
                id: id(1),
                attributes: ApplicationAttributes {
                    city: Some("Springfield".into()),
                    ..Default::default()
                },
                created_at: now,
                updated_at: now,
            },
            members: vec![Member {
                id: id(10),
                application_id: id(1),
                attributes: MemberAttributes::default(),
                created_at: now,
                updated_at: now,
            }],
            vehicles: vec![
                Vehicle {
                    id: id(20),
                    application_id: id(1),
                    owner_id: id(10),
                    attributes: VehicleAttributes::default(),
                    created_at: now,
                    updated_at: now,
                },
                Vehicle {
                    id: id(21),
                    application_id: id(1),
                    owner_id: id(11),
                    attributes: VehicleAttributes::default(),
                    created_at: now,
                    updated_at: now,
                },
            ],
        }
    }

    #[test]
    fn orphaned_vehicles_lists_unowned() {
        let tree = tree();
        let orphans = tree.orphaned_vehicles();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, id(21));
    }

    #[test]
    fn nested_and_flat_shapes() {
        let tree = tree();
        let nested = serde_json::to_value(&tree).unwrap();
        assert_eq!(nested["id"], 1);
        assert_eq!(nested["city"], "Springfield");
        assert_eq!(nested["members"].as_array().unwrap().len(), 1);

        let flat = serde_json::to_value(tree.into_view()).unwrap();
        assert_eq!(flat["application"]["id"], 1);
        assert!(flat["application"].get("members").is_none());
        assert_eq!(flat["vehicles"].as_array().unwrap().len(), 2);
    }
}
