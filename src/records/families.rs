//! Family groupings and their memberships.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{Family, FamilyMember, FamilyMemberDetail, MemberInsert, Patient};
use crate::db::{Database, DatabaseError};

impl FamilyMember {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            family_id: row.get("family_id")?,
            patient_id: row.get("patient_id")?,
            role: row.get("role")?,
            added_at: row.get("added_at")?,
        })
    }
}

fn load_members(conn: &Connection, family_id: i64) -> Result<Vec<FamilyMemberDetail>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT fm.family_id, fm.patient_id, fm.role, fm.added_at,
                p.id, p.name, p.photo_url, p.birth_date, p.email, p.phone, p.address, p.sex,
                p.nationality, p.occupation, p.insurance, p.blood_type, p.created_at
         FROM family_members fm
         JOIN patients p ON p.id = fm.patient_id
         WHERE fm.family_id = ?1
         ORDER BY fm.added_at DESC, fm.patient_id",
    )?;
    let members = stmt
        .query_map(params![family_id], |row| {
            Ok(FamilyMemberDetail {
                member: FamilyMember::from_row(row)?,
                patient: Patient::from_row(row)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(members)
}

fn load_family(conn: &Connection, id: i64) -> Result<Option<Family>, DatabaseError> {
    let family = conn
        .query_row(
            "SELECT id, name, description, owner_id, created_at, updated_at
             FROM families WHERE id = ?1",
            params![id],
            |r| {
                Ok(Family {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    description: r.get(2)?,
                    owner_id: r.get(3)?,
                    created_at: r.get(4)?,
                    updated_at: r.get(5)?,
                    members: Vec::new(),
                })
            },
        )
        .optional()?;

    match family {
        Some(mut family) => {
            family.members = load_members(conn, id)?;
            Ok(Some(family))
        }
        None => Ok(None),
    }
}

fn select_member(
    conn: &Connection,
    family_id: i64,
    patient_id: i64,
) -> Result<Option<FamilyMember>, DatabaseError> {
    let member = conn
        .query_row(
            "SELECT family_id, patient_id, role, added_at FROM family_members
             WHERE family_id = ?1 AND patient_id = ?2",
            params![family_id, patient_id],
            FamilyMember::from_row,
        )
        .optional()?;
    Ok(member)
}

/// Families the patient owns or belongs to, with members.
pub fn for_patient(db: &Database, patient_id: i64) -> Result<Vec<Family>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT f.id FROM families f
             LEFT JOIN family_members fm ON fm.family_id = f.id
             WHERE f.owner_id = ?1 OR fm.patient_id = ?1
             ORDER BY f.id",
        )?;
        let ids = stmt
            .query_map(params![patient_id], |r| r.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut families = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(family) = load_family(conn, id)? {
                families.push(family);
            }
        }
        Ok(families)
    })
}

pub fn get(db: &Database, id: i64) -> Result<Option<Family>, DatabaseError> {
    db.with_conn(|conn| load_family(conn, id))
}

/// Creates a family. A missing owner surfaces as a constraint violation.
pub fn create(
    db: &Database,
    name: &str,
    description: Option<&str>,
    owner_id: i64,
) -> Result<Family, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO families (name, description, owner_id) VALUES (?1, ?2, ?3)",
            params![name, description, owner_id],
        )?;
        let id = conn.last_insert_rowid();
        load_family(conn, id)?.ok_or(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    })
}

pub fn update(
    db: &Database,
    id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<Option<Family>, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE families SET name = ?2, description = ?3, updated_at = datetime('now')
             WHERE id = ?1",
            params![id, name, description],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        load_family(conn, id)
    })
}

/// Removes all members, then the family itself.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM family_members WHERE family_id = ?1", params![id])?;
        let changed = tx.execute("DELETE FROM families WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(changed > 0)
    })
}

/// Adds a patient to a family. Returns `None` when the family does not exist;
/// an existing membership is returned unchanged.
pub fn add_member(
    db: &Database,
    family_id: i64,
    patient_id: i64,
    role: &str,
) -> Result<Option<MemberInsert>, DatabaseError> {
    db.with_conn(|conn| {
        let family_exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM families WHERE id = ?1",
                params![family_id],
                |r| r.get(0),
            )
            .optional()?;
        if family_exists.is_none() {
            return Ok(None);
        }

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO family_members (family_id, patient_id, role)
             VALUES (?1, ?2, ?3)",
            params![family_id, patient_id, role],
        )?;
        let member = select_member(conn, family_id, patient_id)?
            .ok_or(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;

        Ok(Some(if inserted > 0 {
            MemberInsert::Added(member)
        } else {
            MemberInsert::AlreadyMember(member)
        }))
    })
}

pub fn update_member_role(
    db: &Database,
    family_id: i64,
    patient_id: i64,
    role: &str,
) -> Result<Option<FamilyMember>, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE family_members SET role = ?3 WHERE family_id = ?1 AND patient_id = ?2",
            params![family_id, patient_id, role],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        select_member(conn, family_id, patient_id)
    })
}

pub fn remove_member(db: &Database, family_id: i64, patient_id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM family_members WHERE family_id = ?1 AND patient_id = ?2",
            params![family_id, patient_id],
        )?;
        Ok(changed > 0)
    })
}
