//! `deskserver seed`: wipes the store and loads demo users and tickets.

use anyhow::{Context, Result};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use uuid::Uuid;

use crate::auth::hash_password;
use crate::shared::enums::{TicketCategory, TicketPriority, TicketStatus, UserRole, UserStatus};
use crate::shared::models::User;
use crate::shared::schema::{tickets, users};
use crate::shared::utils::{create_conn, run_migrations};
use crate::tickets::lifecycle::{self, NewTicketInput};

struct SeedUser {
    name: &'static str,
    email: &'static str,
    role: UserRole,
    department: &'static str,
}

const SEED_PASSWORD: &str = "password123";

const SEED_USERS: [SeedUser; 4] = [
    SeedUser {
        name: "Admin User",
        email: "admin@company.com",
        role: UserRole::Admin,
        department: "it",
    },
    SeedUser {
        name: "John Agent",
        email: "agent@company.com",
        role: UserRole::Agent,
        department: "it",
    },
    SeedUser {
        name: "Jane Manager",
        email: "manager@company.com",
        role: UserRole::Manager,
        department: "operations",
    },
    SeedUser {
        name: "Bob User",
        email: "user@company.com",
        role: UserRole::User,
        department: "sales",
    },
];

pub fn run() -> Result<()> {
    let pool = create_conn()?;
    run_migrations(&pool)?;
    let mut conn = pool.get().context("Failed to get database connection")?;

    // Clear existing data; ticket children cascade with their parent.
    diesel::delete(tickets::table).execute(&mut conn)?;
    diesel::delete(users::table).execute(&mut conn)?;
    info!("Cleared existing data");

    let now = Utc::now();
    let mut created: Vec<User> = Vec::with_capacity(SEED_USERS.len());
    for seed in SEED_USERS {
        let user = User {
            id: Uuid::new_v4(),
            name: seed.name.to_string(),
            email: seed.email.to_string(),
            password_hash: hash_password(SEED_PASSWORD)?,
            role: seed.role,
            department: seed.department.to_string(),
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(users::table)
            .values(&user)
            .execute(&mut conn)?;
        created.push(user);
    }
    info!("Created {} users", created.len());

    let (agent, manager, user) = (&created[1], &created[2], &created[3]);

    let demo_tickets = [
        (
            "Cannot access email account",
            "I am unable to login to my email account. Getting \"Invalid credentials\" error.",
            TicketStatus::Open,
            TicketPriority::High,
            TicketCategory::ItSupport,
            user.id,
            Some(agent.id),
        ),
        (
            "Request for new laptop",
            "My current laptop is 5 years old and running very slow.",
            TicketStatus::InProgress,
            TicketPriority::Medium,
            TicketCategory::ItSupport,
            user.id,
            Some(agent.id),
        ),
        (
            "VPN connection issues",
            "VPN keeps disconnecting every 10 minutes when working from home.",
            TicketStatus::Resolved,
            TicketPriority::High,
            TicketCategory::ItSupport,
            manager.id,
            Some(agent.id),
        ),
        (
            "Office AC not working",
            "Air conditioning in office room 301 is not working.",
            TicketStatus::Open,
            TicketPriority::Medium,
            TicketCategory::Facilities,
            user.id,
            None,
        ),
        (
            "Payroll inquiry",
            "I have not received my November paycheck yet.",
            TicketStatus::Pending,
            TicketPriority::Critical,
            TicketCategory::Hr,
            user.id,
            Some(manager.id),
        ),
    ];

    for (title, description, status, priority, category, created_by, assigned_to) in demo_tickets
    {
        lifecycle::create_ticket(
            &mut conn,
            NewTicketInput {
                title: title.to_string(),
                description: description.to_string(),
                category,
                priority: Some(priority),
                tags: Vec::new(),
                assigned_to,
                status: Some(status),
            },
            created_by,
        )?;
    }
    info!("Created {} tickets", demo_tickets.len());

    info!("Database seeded successfully");
    info!("Login credentials:");
    info!("Admin: admin@company.com / {}", SEED_PASSWORD);
    info!("Agent: agent@company.com / {}", SEED_PASSWORD);
    info!("Manager: manager@company.com / {}", SEED_PASSWORD);
    info!("User: user@company.com / {}", SEED_PASSWORD);

    Ok(())
}
