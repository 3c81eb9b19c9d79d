use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use background::{BackgroundConfig, BackgroundWorker};
use metastore::build::{Build, BuildId};
use metastore::local::{start_inmemory, start_local};
use metastore::srv::{ReadOptions, Service};
use protogen::catalog as proto;
use serde::Serialize;
use tokio::runtime::{Builder, Runtime};
use tokio::signal;
use tracing::{error, info};

use crate::args::{Commands, InspectArgs, StoreArgs};

impl Commands {
    pub fn run(self, store: StoreArgs) -> Result<()> {
        match self {
            Commands::Server => run_server(store),
            Commands::Inspect(args) => run_inspect(store, args),
        }
    }
}

async fn open_service(store: &StoreArgs) -> Result<Service> {
    let conf = store.metastore_config();
    let service = match &store.data_dir {
        Some(path) => {
            if path.exists() && !path.is_dir() {
                return Err(anyhow!(
                    "Path '{}' is not a valid directory",
                    path.to_string_lossy()
                ));
            }
            start_local(path, conf).await?
        }
        None => start_inmemory(conf).await?,
    };
    Ok(service)
}

fn run_server(store: StoreArgs) -> Result<()> {
    let runtime = build_runtime("catalogd")?;
    runtime.block_on(async move {
        let service = Arc::new(open_service(&store).await?);
        let catalogs = service.list_catalogs().await?;
        info!(?catalogs, data_dir = ?store.data_dir, "metastore ready");

        let conf = BackgroundConfig::from(service.config());
        let worker = BackgroundWorker::new(conf, service.clone());
        let worker = tokio::spawn(worker.begin());

        match signal::ctrl_c().await {
            Ok(()) => info!("shutdown triggered"),
            Err(err) => error!(%err, "unable to listen for shutdown signal"),
        }

        worker.abort();
        info!("shutting down");
        Ok(())
    })
}

fn run_inspect(store: StoreArgs, args: InspectArgs) -> Result<()> {
    if store.data_dir.is_none() {
        return Err(anyhow!("inspect requires --data-dir"));
    }

    let runtime = build_runtime("inspect")?;
    let summaries = runtime.block_on(async move {
        let service = open_service(&store).await?;
        inspect(&service, &args).await
    })?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &summaries)?;
    writeln!(stdout)?;
    Ok(())
}

/// What `inspect` prints for a catalog.
#[derive(Debug, Serialize)]
pub struct CatalogSummary {
    pub name: String,
    pub version: i64,
    pub status: &'static str,
    pub description: String,
    pub databases: Vec<DatabaseSummary>,
    pub builds: Vec<Build>,
}

#[derive(Debug, Serialize)]
pub struct DatabaseSummary {
    pub name: String,
    pub tables: Vec<TableSummary>,
    pub table_groups: Vec<String>,
    pub functions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub version: i64,
    pub build_type: Option<&'static str>,
    pub columns: Vec<String>,
    pub partitions: Vec<String>,
}

impl CatalogSummary {
    fn new(catalog: proto::Catalog, builds: Vec<Build>) -> Self {
        CatalogSummary {
            version: catalog.version,
            status: catalog.status().as_str(),
            databases: catalog
                .databases
                .iter()
                .map(|db| DatabaseSummary {
                    name: db.database_name.clone(),
                    tables: db
                        .tables
                        .iter()
                        .map(|tb| TableSummary {
                            name: tb.table_name.clone(),
                            version: tb.version,
                            build_type: tb.table_structure.as_ref().map(|s| s.build_type().as_str()),
                            columns: tb
                                .table_structure
                                .iter()
                                .flat_map(|s| s.columns.iter().map(|c| c.name.clone()))
                                .collect(),
                            partitions: tb.partitions.iter().map(|p| p.partition_name.clone()).collect(),
                        })
                        .collect(),
                    table_groups: db
                        .table_groups
                        .iter()
                        .map(|g| g.table_group_name.clone())
                        .collect(),
                    functions: db.functions.iter().map(|f| f.function_name.clone()).collect(),
                })
                .collect(),
            name: catalog.catalog_name,
            description: catalog.description,
            builds,
        }
    }
}

async fn inspect(service: &Service, args: &InspectArgs) -> Result<Vec<CatalogSummary>> {
    let names = match &args.catalog {
        Some(name) => vec![name.clone()],
        None => service.list_catalogs().await?,
    };

    let opts = ReadOptions::at_version(args.at_version.unwrap_or(0));
    let mut summaries = Vec::with_capacity(names.len());
    for name in names {
        let catalog = service
            .get_catalog(&name, opts)
            .await?
            .ok_or_else(|| anyhow!("missing catalog: {name}"))?;
        let builds = service.list_builds(&BuildId::for_catalog(&name)).await?;
        summaries.push(CatalogSummary::new(catalog, builds));
    }

    Ok(summaries)
}

fn build_runtime(thread_label: &'static str) -> Result<Runtime> {
    let runtime = Builder::new_multi_thread()
        .thread_name_fn(move || {
            static THREAD_ID: AtomicU64 = AtomicU64::new(0);
            let id = THREAD_ID.fetch_add(1, Ordering::Relaxed);
            format!("{}-thread-{}", thread_label, id)
        })
        .enable_all()
        .build()?;

    Ok(runtime)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use protogen::catalog::BuildType;

    use super::*;

    fn store_args(data_dir: PathBuf) -> StoreArgs {
        StoreArgs {
            data_dir: Some(data_dir),
            store_root: "/store".to_string(),
            reconcile_interval_ms: 10,
        }
    }

    async fn populate(service: &Service) {
        service
            .create_catalog(proto::Catalog {
                catalog_name: "ct1".to_string(),
                description: "inspected".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        service
            .create_database(
                0,
                proto::Database {
                    catalog_name: "ct1".to_string(),
                    database_name: "db1".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service
            .create_table(
                1,
                proto::Table {
                    catalog_name: "ct1".to_string(),
                    database_name: "db1".to_string(),
                    table_name: "tb1".to_string(),
                    table_structure: Some(proto::TableStructure {
                        columns: vec![proto::Column {
                            name: "id".to_string(),
                            column_type: "INT64".to_string(),
                            ..Default::default()
                        }],
                        build_type: BuildType::Offline as i32,
                        shard_count: 1,
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service
            .create_partition(
                2,
                proto::Partition {
                    catalog_name: "ct1".to_string(),
                    database_name: "db1".to_string(),
                    table_name: "tb1".to_string(),
                    partition_name: "part1".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service.reconcile_all().await;
    }

    #[test]
    fn inspect_persisted_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_args(dir.path().to_path_buf());

        let runtime = build_runtime("test").unwrap();
        let summaries = runtime.block_on(async {
            let service = open_service(&store).await.unwrap();
            populate(&service).await;
            drop(service);

            let service = open_service(&store).await.unwrap();
            inspect(
                &service,
                &InspectArgs {
                    catalog: None,
                    at_version: None,
                },
            )
            .await
            .unwrap()
        });

        assert_eq!(1, summaries.len());
        let summary = &summaries[0];
        assert_eq!("ct1", summary.name);
        assert_eq!(3, summary.version);
        assert_eq!("inspected", summary.description);
        assert_eq!(1, summary.builds.len());

        let table = &summary.databases[0].tables[0];
        assert_eq!(Some(BuildType::Offline.as_str()), table.build_type);
        assert_eq!(vec!["id".to_string()], table.columns);
        assert_eq!(vec!["part1".to_string()], table.partitions);

        let json = serde_json::to_value(&summaries).unwrap();
        assert_eq!("ct1", json[0]["name"]);
    }

    #[test]
    fn inspect_older_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_args(dir.path().to_path_buf());

        let runtime = build_runtime("test").unwrap();
        let summaries = runtime.block_on(async {
            let service = open_service(&store).await.unwrap();
            populate(&service).await;
            inspect(
                &service,
                &InspectArgs {
                    catalog: Some("ct1".to_string()),
                    at_version: Some(1),
                },
            )
            .await
            .unwrap()
        });

        assert_eq!(1, summaries[0].version);
        assert_eq!(1, summaries[0].databases.len());
        assert!(summaries[0].databases[0].tables.is_empty());
    }

    #[test]
    fn inspect_requires_data_dir() {
        let store = StoreArgs {
            data_dir: None,
            store_root: "/store".to_string(),
            reconcile_interval_ms: 10,
        };
        let args = InspectArgs {
            catalog: None,
            at_version: None,
        };
        assert!(run_inspect(store, args).is_err());
    }
}
