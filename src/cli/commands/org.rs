use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::services::OrgService;

#[derive(Subcommand)]
pub enum OrgCommands {
    #[command(about = "Register a clinic and provision its database")]
    Create {
        /// Organization slug (lowercase, also the URL prefix)
        name: String,

        #[arg(long)]
        admin_email: String,

        #[arg(long)]
        admin_password: String,
    },

    #[command(about = "List registered clinics")]
    List,

    #[command(about = "Show one clinic by slug")]
    Show { name: String },

    #[command(about = "Destroy a clinic: its database, role, and registry row")]
    Delete { id: Uuid },
}

pub async fn run(cmd: OrgCommands, json_output: bool) -> anyhow::Result<()> {
    let service = OrgService::new().await?;

    match cmd {
        OrgCommands::Create {
            name,
            admin_email,
            admin_password,
        } => {
            let org = service
                .create_organization(&name, &admin_email, &admin_password)
                .await?;
            if json_output {
                println!("{}", json!({ "organization": org }));
            } else {
                println!("Created organization '{}' (database {})", org.name, org.database);
            }
        }
        OrgCommands::List => {
            let orgs = service.list_organizations().await?;
            if json_output {
                println!("{}", json!({ "organizations": orgs }));
            } else {
                for org in orgs {
                    println!("{}  {}  {}", org.id, org.name, org.database);
                }
            }
        }
        OrgCommands::Show { name } => {
            let org = service
                .get_organization(&name)
                .await?
                .ok_or_else(|| anyhow::anyhow!("organization '{}' not found", name))?;
            if json_output {
                println!("{}", json!({ "organization": org }));
            } else {
                println!("{}  {}  {}  created {}", org.id, org.name, org.database, org.created_at);
            }
        }
        OrgCommands::Delete { id } => {
            let org = service.delete_organization(id).await?;
            if json_output {
                println!("{}", json!({ "deleted": org.name }));
            } else {
                println!("Destroyed organization '{}'", org.name);
            }
        }
    }

    Ok(())
}
