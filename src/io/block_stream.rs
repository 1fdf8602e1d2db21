use bytes::{
    BufMut,
    BytesMut,
};
use tracing::trace;

use crate::block::{
    Block,
    BlockInfo,
};
use crate::column::sparse::read_column;
use crate::column::{
    create_column,
    ColumnOptions,
};
use crate::io::buffer_utils;
use crate::io::BufferedReader;
use crate::protocol::revision;
use crate::types::Type;
use crate::{
    Error,
    Result,
};

/// Decodes blocks from an (already decompressed) byte stream.
#[derive(Debug, Clone, Copy)]
pub struct BlockReader {
    revision: u64,
    options: ColumnOptions,
}

impl BlockReader {
    pub fn new(revision: u64, options: ColumnOptions) -> Self {
        Self { revision, options }
    }

    pub async fn read_block(
        &self,
        reader: &mut BufferedReader<'_>,
    ) -> Result<Block> {
        let mut block = Block::new();

        if self.revision >= revision::WITH_BLOCK_INFO {
            block.set_info(read_block_info(reader).await?);
        }

        let num_columns = reader.read_varint().await? as usize;
        let num_rows = reader.read_varint().await? as usize;

        for _ in 0..num_columns {
            let name = reader.read_string().await?;
            let type_name = reader.read_string().await?;

            let has_custom_serialization = self.revision
                >= revision::WITH_CUSTOM_SERIALIZATION
                && reader.read_u8().await? != 0;

            let values = if num_rows > 0 {
                let column = create_column(&Type::parse(&type_name)?, self.options)?;
                read_column(
                    column.as_ref(),
                    reader,
                    num_rows,
                    has_custom_serialization,
                )
                .await
                .map_err(|e| e.with_column(&name))?
            } else {
                Vec::new()
            };

            block.append_column(name, type_name, values)?;
        }

        trace!(
            columns = num_columns,
            rows = num_rows,
            "Read block"
        );
        Ok(block)
    }
}

/// Block info is a sequence of numbered fields ended by field 0.
async fn read_block_info(reader: &mut BufferedReader<'_>) -> Result<BlockInfo> {
    let mut info = BlockInfo::default();
    loop {
        match reader.read_varint().await? {
            0 => return Ok(info),
            1 => info.is_overflows = reader.read_u8().await? != 0,
            2 => info.bucket_num = reader.read_i32_le().await?,
            field => {
                return Err(Error::Protocol(format!(
                    "Unknown block info field {}",
                    field
                )))
            }
        }
    }
}

fn write_block_info(info: &BlockInfo, buffer: &mut BytesMut) {
    buffer_utils::write_varint(buffer, 1);
    buffer.put_u8(info.is_overflows as u8);
    buffer_utils::write_varint(buffer, 2);
    buffer.put_i32_le(info.bucket_num);
    buffer_utils::write_varint(buffer, 0);
}

/// Encodes blocks; the output is compressed by the caller if needed.
#[derive(Debug, Clone, Copy)]
pub struct BlockWriter {
    revision: u64,
    options: ColumnOptions,
}

impl BlockWriter {
    pub fn new(revision: u64, options: ColumnOptions) -> Self {
        Self { revision, options }
    }

    /// Serialize a block. Value errors carry the column name; nothing is
    /// appended to `buffer` when one occurs.
    pub fn write_block(&self, block: &Block, buffer: &mut BytesMut) -> Result<()> {
        let mut out = BytesMut::new();
        if self.revision >= revision::WITH_BLOCK_INFO {
            write_block_info(block.info(), &mut out);
        }

        buffer_utils::write_varint(&mut out, block.column_count() as u64);
        buffer_utils::write_varint(&mut out, block.row_count() as u64);

        for (name, type_name, values) in block.iter() {
            buffer_utils::write_string(&mut out, name);
            buffer_utils::write_string(&mut out, type_name);

            if self.revision >= revision::WITH_CUSTOM_SERIALIZATION {
                out.put_u8(0);
            }

            if block.row_count() > 0 {
                let column = create_column(&Type::parse(type_name)?, self.options)?;
                column
                    .write_state_prefix(&mut out)
                    .and_then(|_| column.write_items(values, &mut out))
                    .map_err(|e| e.with_column(name))?;
            }
        }

        buffer.extend_from_slice(&out);
        Ok(())
    }
}
