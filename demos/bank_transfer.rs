use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tracing::{info, Level};

use lockdb::accessor::{
    entity::{Field, Tuple},
    method,
};
use lockdb::buffer::manager::BufferPoolManager;
use lockdb::config::Config;
use lockdb::rdbms::{clocksweep::ClockSweepManager, disk::DiskManager, heap::HeapFile};
use lockdb::storage::entity::TableId;
use lockdb::tx::TransactionId;

const ACCOUNTS: TableId = TableId(1);
const NUM_ACCOUNTS: i64 = 8;
const INITIAL_BALANCE: i64 = 1_000;
const WORKERS: i64 = 4;
const TRANSFERS: i64 = 25;

type Bank = ClockSweepManager<DiskManager>;

fn is_aborted(err: &anyhow::Error) -> bool {
    err.downcast_ref::<method::Error>()
        .map_or(false, method::Error::is_aborted)
}

fn account(id: i64, balance: i64) -> Tuple {
    Tuple::new(vec![Field::Int(id), Field::Int(balance)])
}

fn transfer(bank: &Bank, tid: TransactionId, from: i64, to: i64, amount: i64) -> Result<()> {
    let accounts = bank.scan_table(tid, ACCOUNTS)?;
    let find = |id: i64| {
        accounts
            .iter()
            .find(|tuple| tuple.int(0) == Some(id))
            .ok_or_else(|| anyhow!("no account {}", id))
    };
    let (source, target) = (find(from)?, find(to)?);
    if source.int(1).unwrap_or_default() < amount {
        return Ok(());
    }
    for (tuple, delta) in [(source, -amount), (target, amount)] {
        let id = tuple.int(0).unwrap_or_default();
        let balance = tuple.int(1).unwrap_or_default() + delta;
        bank.delete_tuple(tid, tuple)?;
        bank.insert_tuple(tid, ACCOUNTS, &account(id, balance))?;
    }
    Ok(())
}

// Returns how many attempts were aborted before the transfer committed
fn run_transfer(bank: &Bank, from: i64, to: i64, amount: i64) -> Result<u32> {
    let mut retries = 0;
    loop {
        let tid = TransactionId::new();
        match transfer(bank, tid, from, to, amount) {
            Ok(()) => {
                bank.commit(tid)?;
                return Ok(retries);
            }
            Err(err) if is_aborted(&err) => {
                bank.abort(tid)?;
                retries += 1;
                thread::sleep(Duration::from_millis(u64::from(retries.min(10)) * 3));
            }
            Err(err) => {
                bank.abort(tid)?;
                return Err(err);
            }
        }
    }
}

fn total_balance(bank: &Bank) -> Result<i64> {
    let tid = TransactionId::new();
    let accounts = bank.scan_table(tid, ACCOUNTS)?;
    bank.commit(tid)?;
    Ok(accounts.iter().filter_map(|tuple| tuple.int(1)).sum())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    // config
    let dir = tempfile::tempdir()?;
    let config = Config::default()
        .with_page_size(256)
        .with_pool_size(8)
        .with_lock_timeout(Duration::from_millis(50));
    let disk = DiskManager::open(dir.path(), config.page_size)?;
    let bank = Arc::new(ClockSweepManager::new(disk, &config)?);
    bank.register_table(Arc::new(HeapFile::new(ACCOUNTS, 32)));

    // open accounts
    let tid = TransactionId::new();
    for id in 0..NUM_ACCOUNTS {
        bank.insert_tuple(tid, ACCOUNTS, &account(id, INITIAL_BALANCE))?;
    }
    bank.commit(tid)?;

    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let bank = Arc::clone(&bank);
            thread::spawn(move || -> Result<u32> {
                let mut retries = 0;
                for i in 0..TRANSFERS {
                    let from = (worker * 7 + i * 3) % NUM_ACCOUNTS;
                    let to = (from + 1 + i % (NUM_ACCOUNTS - 1)) % NUM_ACCOUNTS;
                    retries += run_transfer(&bank, from, to, 10 + i)?;
                }
                Ok(retries)
            })
        })
        .collect();
    let mut retries = 0;
    for worker in workers {
        retries += worker
            .join()
            .map_err(|_| anyhow!("transfer worker panicked"))??;
    }

    let total = total_balance(&bank)?;
    info!(transfers = WORKERS * TRANSFERS, retries, total, "done");
    if total != NUM_ACCOUNTS * INITIAL_BALANCE {
        bail!("money was created or lost: total {}", total);
    }
    Ok(())
}
