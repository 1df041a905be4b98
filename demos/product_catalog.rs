/// Product catalog walk-through: schema declaration, CRUD against the
/// clustered index, a covering secondary lookup and full-text search.
use shelfdb::core::database::Database;
use shelfdb::core::types::{Record, Value};
use shelfdb::schema::schema::{CollectionSchema, ColumnDefinition, DataType, IndexDefinition};

fn product(id: i64, name: &str, category: &str, price: f64) -> Record {
    Record::from([
        ("id".to_string(), Value::Int(id)),
        ("name".to_string(), Value::Text(name.to_string())),
        ("category".to_string(), Value::Text(category.to_string())),
        ("price".to_string(), Value::Float(price)),
    ])
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("shelfdb_demo");
    let _ = std::fs::remove_dir_all(&dir);

    let db = Database::open(&dir)?;
    db.create_collection(
        CollectionSchema::new("products")
            .description("Product catalog")
            .column(ColumnDefinition::new("id", DataType::Int).unique())
            .column(ColumnDefinition::new("name", DataType::String).full_text())
            .column(ColumnDefinition::new("category", DataType::String))
            .column(ColumnDefinition::new("price", DataType::Float))
            .index(
                IndexDefinition::new("primary")
                    .key("id", true)
                    .unique()
                    .clustered()
                    .page_size(3),
            )
            .index(
                IndexDefinition::new("by_category")
                    .key("category", true)
                    .include("price")
                    .page_size(3),
            )
            .full_text(),
    )?;
    let products = db.collection("products")?;

    println!("Inserting products...");
    products.insert(&product(1, "Laptop Pro", "electronics", 1299.0))?;
    products.insert(&product(2, "Standing Desk", "furniture", 449.0))?;
    products.insert(&product(3, "Mechanical Keyboard", "electronics", 129.0))?;
    products.insert(&product(4, "Office Chair", "furniture", 319.0))?;

    println!("Point lookup by id 3:");
    for record in products.find(Some(&vec![Value::Int(3)]))? {
        println!("  {:?}", record.get("name"));
    }

    println!("Covering lookup on by_category = electronics:");
    for record in products.find_by_index(
        "by_category",
        Some(&vec![Value::Text("electronics".into())]),
    )? {
        println!("  {:?} at {:?}", record.get("category"), record.get("price"));
    }

    println!("Full-text search for 'keyboard':");
    for doc in products.search_full_text("keyboard")? {
        println!("  matched document {}", doc);
    }

    println!("Updating and deleting...");
    products.update(
        &product(2, "Standing Desk", "furniture", 449.0),
        &product(2, "Standing Desk", "furniture", 399.0),
    )?;
    products.delete(&product(4, "Office Chair", "furniture", 319.0))?;

    println!("All products in key order:");
    for record in products.find(None)? {
        println!(
            "  #{:?} {:?} {:?}",
            record.get("id"),
            record.get("name"),
            record.get("price")
        );
    }

    for stats in products.stats()? {
        println!(
            "index '{}': {} nodes, {} rows, height {}",
            stats.index_name, stats.node_count, stats.row_count, stats.height
        );
    }

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
