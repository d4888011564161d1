//! Jetpath - PetShop demo server
//!
//! Serves a small in-memory pet inventory to exercise inline, deferred,
//! validated and streamed responses.

use jetpath::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Pet {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    age: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

type Store = Arc<RwLock<Vec<Pet>>>;

fn not_found(ctx: &mut Context, code: u16) -> Flow {
    ctx.code = code;
    ctx.send(json!({ "message": "Pet not found" }))
}

/// GET / - plain greeting.
struct Home;

#[async_trait]
impl Handler for Home {
    async fn call(&self, ctx: &mut Context) -> Flow {
        tracing::info!("App extensions: {:?}", ctx.app().names());
        ctx.send("hello world")
    }
}

/// GET /greet - answers a second later through a deferred responder.
struct Greet;

#[async_trait]
impl Handler for Greet {
    async fn call(&self, ctx: &mut Context) -> Flow {
        let mut responder = ctx.defer();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = responder.send("Welcome to Petshop!");
        });
        ctx.eject()
    }
}

/// GET /pets
struct ListPets(Store);

#[async_trait]
impl Handler for ListPets {
    async fn call(&self, ctx: &mut Context) -> Flow {
        let pets = self.0.read().await;
        ctx.send(&*pets)
    }
}

/// GET /petBy/:id
struct GetPet(Store);

#[async_trait]
impl Handler for GetPet {
    async fn call(&self, ctx: &mut Context) -> Flow {
        let id = ctx.param("id").unwrap_or_default().to_string();
        let pets = self.0.read().await;
        match pets.iter().find(|pet| pet.id.as_deref() == Some(id.as_str())) {
            Some(pet) => ctx.send(pet),
            None => not_found(ctx, 404),
        }
    }
}

/// POST /pets
struct AddPet(Store);

#[async_trait]
impl Handler for AddPet {
    async fn call(&self, ctx: &mut Context) -> Flow {
        ctx.json().await?;
        let mut pet: Pet = ctx.validate_as()?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        pet.id = Some(millis.to_string());
        self.0.write().await.push(pet.clone());
        ctx.send(json!({ "message": "Pet added successfully", "pet": pet }))
    }
}

/// GET /pets/search?name=
struct SearchPets(Store);

#[async_trait]
impl Handler for SearchPets {
    async fn call(&self, ctx: &mut Context) -> Flow {
        let search = serde_json::to_value(ctx.search())?;
        let query = ctx.validate_value(&search)?;
        let name = query["name"].as_str().unwrap_or_default();
        let pets = self.0.read().await;
        let found: Vec<&Pet> = pets.iter().filter(|pet| pet.name.contains(name)).collect();
        ctx.send(json!({ "message": "Pets searched successfully", "pets": found }))
    }
}

/// PUT /petBy/:id
struct UpdatePet(Store);

#[async_trait]
impl Handler for UpdatePet {
    async fn call(&self, ctx: &mut Context) -> Flow {
        ctx.json().await?;
        let update = ctx.validate()?;
        let id = ctx.param("id").unwrap_or_default().to_string();

        let mut pets = self.0.write().await;
        let Some(pet) = pets.iter_mut().find(|pet| pet.id.as_deref() == Some(id.as_str())) else {
            return not_found(ctx, 404);
        };

        let mut merged = serde_json::to_value(&*pet)?;
        if let (Value::Object(target), Value::Object(changes)) = (&mut merged, update) {
            target.extend(changes);
        }
        *pet = serde_json::from_value(merged)?;
        ctx.send(json!({ "message": "Pet updated successfully", "pet": pet }))
    }
}

/// DELETE /petBy/:id
struct DeletePet(Store);

#[async_trait]
impl Handler for DeletePet {
    async fn call(&self, ctx: &mut Context) -> Flow {
        let id = ctx.param("id").unwrap_or_default().to_string();
        let mut pets = self.0.write().await;
        match pets.iter().position(|pet| pet.id.as_deref() == Some(id.as_str())) {
            Some(index) => {
                let pet = pets.remove(index);
                ctx.send(json!({ "message": "Pet deleted successfully", "pet": pet }))
            }
            None => not_found(ctx, 400),
        }
    }
}

/// GET /pets/export - streams the inventory from a file.
struct ExportPets(Store);

#[async_trait]
impl Handler for ExportPets {
    async fn call(&self, ctx: &mut Context) -> Flow {
        let path = std::env::temp_dir().join("jetpath-pets.json");
        let snapshot = serde_json::to_vec_pretty(&*self.0.read().await)?;
        tokio::fs::write(&path, snapshot).await?;
        ctx.send_stream(path, "application/json")
    }
}

/// GET /error - always fails; the error hook answers.
struct Fail;

#[async_trait]
impl Handler for Fail {
    async fn call(&self, _ctx: &mut Context) -> Flow {
        Err(JetError::handler("boohoo").into())
    }
}

fn pet_schema() -> Schema {
    Schema::new()
        .field("name", FieldSchema::new(FieldType::String).err("please provide dog name"))
        .field("image", FieldSchema::new(FieldType::String).optional().input_type("file"))
        .field("age", FieldSchema::new(FieldType::Number).optional().input_type("number"))
        .field("id", FieldSchema::any())
}

fn update_schema() -> Schema {
    Schema::new()
        .field("name", FieldSchema::new(FieldType::String).err("please provide dog name"))
        .field("image", FieldSchema::new(FieldType::String).optional().input_type("file"))
        .field("age", FieldSchema::new(FieldType::Number).optional().input_type("number"))
}

fn search_schema() -> Schema {
    Schema::new().field("name", FieldSchema::new(FieldType::String))
}

fn hello_plugin() -> Plugin {
    Plugin::new(|plugin, init| {
        Log::info(format!("{} plugin loaded under {}", plugin.label(), init.runtime));
        Ok(Extensions::new().with("hello", |_| {
            Log::info("hello world");
            Ok(Value::Null)
        }))
    })
    .name("hello")
    .version("1.0.0")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    Log::info("Starting PetShop API...");

    let config = JetConfig::from_env()?.global_header("X-PET-TOKEN", "xxxxxxxxxxxxxxx");
    let store: Store = Arc::default();

    let server = JetServer::new(config)
        .plugin(hello_plugin())
        .route(Method::GET, "/", Home)
        .route(Method::GET, "/greet", Greet)
        .route(Method::GET, "/pets", ListPets(store.clone()))
        .route(Method::GET, "/pets/export", ExportPets(store.clone()))
        .route_with_schema(Method::GET, "/pets/search", search_schema(), SearchPets(store.clone()))
        .route_with_schema(Method::POST, "/pets", pet_schema(), AddPet(store.clone()))
        .route(Method::GET, "/petBy/:id", GetPet(store.clone()))
        .route_with_schema(Method::PUT, "/petBy/:id", update_schema(), UpdatePet(store.clone()))
        .route(Method::DELETE, "/petBy/:id", DeletePet(store))
        .route(Method::GET, "/error", Fail)
        .on_error(|ctx, err| {
            if err.is_client_error() {
                ctx.throw((err.status(), err.to_string()))
            } else {
                Log::warn(format!("boohoo: {}", err));
                ctx.throw(())
            }
        });

    Log::info("Try: curl http://localhost:8080/pets");
    Log::info("Try: curl -X POST -d '{\"name\":\"Rex\",\"age\":4}' http://localhost:8080/pets");
    Log::info("Try: curl http://localhost:8080/greet");

    // Run the server
    server.run().await?;
    Ok(())
}
